//! Packaging discovery from a checkout's files

use crate::spec::Packaging;
use std::path::Path;
use tracing::debug;

/// Detect how a checkout is packaged
///
/// A gemspec takes precedence, then a Capfile, then a Gemfile.
pub fn detect_packaging(dir: &Path) -> (Packaging, Option<String>) {
    if let Some(gemspec) = find_gemspec(dir) {
        debug!("Found gemspec {} in {}", gemspec, dir.display());
        return (Packaging::Gem, Some(gemspec));
    }
    if dir.join("Capfile").is_file() {
        return (Packaging::Capistrano, None);
    }
    if dir.join("Gemfile").is_file() {
        return (Packaging::Bundler, None);
    }
    (Packaging::None, None)
}

/// First gemspec in the directory, by file name
fn find_gemspec(dir: &Path) -> Option<String> {
    let pattern = format!(
        "{}/*.gemspec",
        glob::Pattern::escape(&dir.to_string_lossy())
    );
    let mut names: Vec<String> = glob::glob(&pattern)
        .ok()?
        .filter_map(Result::ok)
        .filter(|path| path.is_file())
        .filter_map(|path| path.file_name().map(|n| n.to_string_lossy().into_owned()))
        .collect();
    names.sort();
    names.into_iter().next()
}
