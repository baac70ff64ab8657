//! Sample scene documents for testing and demonstration.
//!
//! Each template exercises different parts of the pipeline: multi-page
//! print output, personalization placeholders, and template-only pages.

/// Six-page wall calendar, A4 portrait in points. The grid and month
/// banners are template content; the notes are user content.
pub fn calendar() -> &'static str {
    r##"{
    "title": "Wall Calendar 2026",
    "width": 595,
    "height": 842,
    "current_page": 0,
    "pages": [
        {"background": "#fdf6e3", "elements": [
            {"type": "rect", "x": 0, "y": 0, "width": 595, "height": 120, "fill": "#1a365d", "template": true},
            {"type": "text", "x": 297, "y": 40, "text": "JANUARY", "font_size": 48, "color": "#ffffff", "align": "center", "template": true},
            {"type": "rect", "x": 40, "y": 160, "width": 515, "height": 620, "fill": "#eee8d5", "template": true},
            {"type": "text", "x": 60, "y": 180, "text": "Dentist 14:00", "font_size": 18, "color": "#333333"}
        ]},
        {"background": "#fdf6e3", "elements": [
            {"type": "rect", "x": 0, "y": 0, "width": 595, "height": 120, "fill": "#2c5282", "template": true},
            {"type": "text", "x": 297, "y": 40, "text": "FEBRUARY", "font_size": 48, "color": "#ffffff", "align": "center", "template": true},
            {"type": "rect", "x": 40, "y": 160, "width": 515, "height": 620, "fill": "#eee8d5", "template": true}
        ]},
        {"background": "#fdf6e3", "elements": [
            {"type": "rect", "x": 0, "y": 0, "width": 595, "height": 120, "fill": "#276749", "template": true},
            {"type": "text", "x": 297, "y": 40, "text": "MARCH", "font_size": 48, "color": "#ffffff", "align": "center", "template": true},
            {"type": "rect", "x": 40, "y": 160, "width": 515, "height": 620, "fill": "#eee8d5", "template": true},
            {"type": "text", "x": 60, "y": 300, "text": "Spring break", "font_size": 18, "color": "#333333"}
        ]},
        {"background": "#fdf6e3", "elements": [
            {"type": "rect", "x": 0, "y": 0, "width": 595, "height": 120, "fill": "#9c4221", "template": true},
            {"type": "text", "x": 297, "y": 40, "text": "APRIL", "font_size": 48, "color": "#ffffff", "align": "center", "template": true},
            {"type": "rect", "x": 40, "y": 160, "width": 515, "height": 620, "fill": "#eee8d5", "template": true}
        ]},
        {"background": "#fdf6e3", "elements": [
            {"type": "rect", "x": 0, "y": 0, "width": 595, "height": 120, "fill": "#702459", "template": true},
            {"type": "text", "x": 297, "y": 40, "text": "MAY", "font_size": 48, "color": "#ffffff", "align": "center", "template": true},
            {"type": "rect", "x": 40, "y": 160, "width": 515, "height": 620, "fill": "#eee8d5", "template": true}
        ]},
        {"background": "#fdf6e3", "elements": [
            {"type": "rect", "x": 0, "y": 0, "width": 595, "height": 120, "fill": "#553c9a", "template": true},
            {"type": "text", "x": 297, "y": 40, "text": "JUNE", "font_size": 48, "color": "#ffffff", "align": "center", "template": true},
            {"type": "rect", "x": 40, "y": 160, "width": 515, "height": 620, "fill": "#eee8d5", "template": true},
            {"type": "text", "x": 60, "y": 500, "text": "Holiday!", "font_size": 18, "color": "#333333"}
        ]}
    ]
}"##
}

/// One-page greeting card with `{{name}}` and `{{ sender }}` placeholders.
pub fn greeting_card() -> &'static str {
    r##"{
    "title": "Birthday Card",
    "width": 420,
    "height": 595,
    "pages": [
        {"background": "#fff5f7", "elements": [
            {"type": "rect", "x": 20, "y": 20, "width": 380, "height": 555, "fill": "#fed7e2", "template": true},
            {"type": "text", "x": 210, "y": 200, "text": "Happy birthday, {{name}}!", "font_size": 28, "color": "#97266d", "align": "center"},
            {"type": "text", "x": 210, "y": 420, "text": "From {{ sender }}", "font_size": 18, "color": "#702459", "align": "center"}
        ]}
    ]
}"##
}

/// Smallest valid document: one blank page.
pub fn minimal() -> &'static str {
    r##"{"width": 100, "height": 100, "pages": [{}]}"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::SceneDocument;
    use crate::surface::{Personalize, RenderSurface};

    #[test]
    fn templates_parse() {
        assert_eq!(SceneDocument::from_json(calendar()).unwrap().page_count(), 6);
        assert_eq!(SceneDocument::from_json(minimal()).unwrap().page_count(), 1);
        let card = SceneDocument::from_json(greeting_card()).unwrap();
        assert_eq!(card.text_fields().len(), 2);
        assert_eq!(card.title().as_deref(), Some("Birthday Card"));
    }
}
