//! Announcement post formatting.

/// Formats the two-line BBCode post embedding the cover image and the
/// archive download link.
pub fn format_post(cover_url: &str, archive_url: &str) -> String {
    format!("[img]{cover_url}[/img]\n[code]{archive_url}[/code]")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_embeds_both_urls() {
        let post = format_post("http://img.example/c.png", "http://host.example/file");
        assert_eq!(
            post,
            "[img]http://img.example/c.png[/img]\n[code]http://host.example/file[/code]"
        );
    }

    #[test]
    fn post_is_two_lines() {
        assert_eq!(format_post("a", "b").lines().count(), 2);
    }
}
