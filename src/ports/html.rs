// src/ports/html.rs
use crate::application::image_cache::placeholder_data_uri;
use crate::application::ImageLookup;
use crate::domain::{ImageId, Note};
use crate::infrastructure::markdown::markdown_to_html;
use chrono::SecondsFormat;
use html_escape::{encode_double_quoted_attribute, encode_text};
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use tracing::instrument;

lazy_static! {
    static ref IMAGE_SRC_REGEX: Regex = Regex::new(r#"<img src="image://([^"]+)""#)
        .expect("Failed to compile image src regex");
}

#[derive(Debug, Default)]
pub struct HtmlPresenter;

impl HtmlPresenter {
    pub fn new() -> Self {
        Self
    }

    /// Replace `image://<id>` sources with resolved handles or the placeholder.
    ///
    /// Every substituted tag keeps its id in `data-image-id`, so a later pass
    /// can target exactly the images that were still unresolved.
    #[instrument(level = "trace", skip(self, html, images))]
    pub fn substitute_images(&self, html: &str, images: &dyn ImageLookup) -> String {
        IMAGE_SRC_REGEX
            .replace_all(html, |caps: &Captures| {
                let id = ImageId::new(&caps[1]);
                let id_attr = encode_double_quoted_attribute(id.as_str());
                match images.lookup(&id) {
                    Some(handle) => format!(
                        r#"<img src="{}" data-image-id="{id_attr}""#,
                        encode_double_quoted_attribute(&handle.url())
                    ),
                    None => format!(
                        r#"<img src="{}" data-image-id="{id_attr}" class="image-placeholder""#,
                        placeholder_data_uri()
                    ),
                }
            })
            .into_owned()
    }

    /// HTML fragment for a markdown body.
    pub fn render_body(&self, markdown: &str, images: &dyn ImageLookup) -> String {
        self.substitute_images(&markdown_to_html(markdown), images)
    }

    pub fn render(&self, note: &Note, notebook_title: &str, images: &dyn ImageLookup) -> String {
        let body = self.render_body(&note.content, images);
        let title = encode_text(note.display_title());

        format!(
            r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <title>{title}</title>
    <style>
        body {{
            font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, sans-serif;
            line-height: 1.6;
            max-width: 800px;
            margin: 2rem auto;
            padding: 0 1rem;
            background-color: #f5f5f5;
        }}
        .note {{
            background: white;
            border-radius: 8px;
            padding: 2rem;
            box-shadow: 0 2px 4px rgba(0,0,0,0.1);
        }}
        pre {{
            white-space: pre-wrap;
            word-wrap: break-word;
            background-color: #f8f9fa;
            padding: 1rem;
            border-radius: 4px;
        }}
        img {{
            max-width: 100%;
        }}
        .note-info {{
            margin-top: 1rem;
            padding-top: 1rem;
            border-top: 1px solid #eee;
            font-size: 0.9em;
            color: #666;
        }}
    </style>
</head>
<body>
    <div class="note">
        <h1>{title}</h1>
        <div class="note-content">{body}</div>
        <div class="note-info">
            <div>Note ID: {note_id}</div>
            <div>Notebook: {notebook}</div>
            <div>Updated: {updated}</div>
        </div>
    </div>
</body>
</html>"#,
            note_id = note.id,
            notebook = encode_text(notebook_title),
            updated = note.updated_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ImageHandle;
    use crate::util::testing::note;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Arc;

    #[derive(Default)]
    struct Resolved(HashMap<ImageId, Arc<ImageHandle>>);

    impl Resolved {
        fn with(mut self, id: &str, path: &str) -> Self {
            let id = ImageId::new(id);
            self.0.insert(
                id.clone(),
                Arc::new(ImageHandle {
                    id,
                    path: PathBuf::from(path),
                }),
            );
            self
        }
    }

    impl ImageLookup for Resolved {
        fn lookup(&self, id: &ImageId) -> Option<Arc<ImageHandle>> {
            self.0.get(id).cloned()
        }
    }

    #[test]
    fn given_unresolved_image_when_rendering_then_shows_placeholder_with_id() {
        let html = HtmlPresenter::new().render_body("![x](image://abc)", &Resolved::default());

        assert!(html.contains(&placeholder_data_uri()));
        assert!(html.contains(r#"data-image-id="abc""#));
        assert!(!html.contains("image://abc"));
    }

    #[test]
    fn given_resolved_image_when_rendering_then_uses_handle_url() {
        let images = Resolved::default().with("abc", "/tmp/abc.png");

        let html = HtmlPresenter::new().render_body("![x](image://abc)", &images);

        assert!(html.contains(r#"src="file:///tmp/abc.png""#));
        assert!(!html.contains("image-placeholder"));
    }

    #[test]
    fn given_mixed_images_when_rendering_then_only_unresolved_get_placeholder() {
        let images = Resolved::default().with("abc", "/tmp/abc.png");

        let html = HtmlPresenter::new()
            .render_body("![a](image://abc) ![b](image://def)", &images);

        assert_eq!(html.matches("image-placeholder").count(), 1);
        assert!(html.contains(r#"data-image-id="def" class="image-placeholder""#));
    }

    #[test]
    fn given_note_with_markup_in_title_when_rendering_page_then_escapes_it() {
        let mut n = note(1, 1, "<script>alert(1)</script>");
        n.content = "**body**".to_string();

        let page = HtmlPresenter::new().render(&n, "Work", &Resolved::default());

        assert!(page.contains("&lt;script&gt;"));
        assert!(page.contains("<strong>body</strong>"));
        assert!(page.contains("Notebook: Work"));
    }
}
