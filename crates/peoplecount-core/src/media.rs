//! Mapping between stored image paths and their public URLs.

use std::path::Path;

/// Builds the public URL for a stored image from its filename alone.
///
/// Directory components of `stored_path` are never exposed. Returns `None`
/// when the path has no filename component (e.g. it ends in `..`).
#[must_use]
pub fn public_image_url(url_prefix: &str, stored_path: &str) -> Option<String> {
    let file_name = Path::new(stored_path).file_name()?.to_str()?;
    Some(format!(
        "{}/{}",
        url_prefix.trim_end_matches('/'),
        file_name
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_directory_components() {
        assert_eq!(
            public_image_url("/static", "static/abc123.jpg").as_deref(),
            Some("/static/abc123.jpg")
        );
        assert_eq!(
            public_image_url("/static", "/srv/app/static/nested/abc123.jpg").as_deref(),
            Some("/static/abc123.jpg")
        );
    }

    #[test]
    fn accepts_bare_filename_and_trailing_slash_prefix() {
        assert_eq!(
            public_image_url("/images/", "abc123.jpg").as_deref(),
            Some("/images/abc123.jpg")
        );
    }

    #[test]
    fn rejects_paths_without_filename() {
        assert_eq!(public_image_url("/static", "static/.."), None);
        assert_eq!(public_image_url("/static", ""), None);
    }
}
