// HTML pages for the upload form and the analysis results

use crate::models::AnalysisReport;
use std::fmt::Write;

/// URL prefix under which stored images are served
pub const UPLOADS_URL: &str = "/static/uploads";

const STYLE: &str = "body{font-family:sans-serif;max-width:960px;margin:2em auto;padding:0 1em}\
.error{color:#b00020}.images{display:flex;gap:1em;flex-wrap:wrap}\
.images figure{margin:0}.images img{max-width:460px;height:auto}";

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>{title}</title>\n<style>{STYLE}</style>\n</head>\n<body>\n{body}</body>\n</html>\n",
        title = escape_html(title),
    )
}

fn image_url(filename: &str) -> String {
    format!("{UPLOADS_URL}/{}", escape_html(filename))
}

/// Upload form, optionally with an error message above it.
pub fn index_page(error: Option<&str>) -> String {
    let mut body = String::from("<h1>Face Emotion Detector</h1>\n");
    if let Some(error) = error {
        let _ = writeln!(body, "<p class=\"error\">{}</p>", escape_html(error));
    }
    body.push_str(
        "<form method=\"post\" action=\"/\" enctype=\"multipart/form-data\">\n\
         <input type=\"file\" name=\"file\" accept=\".png,.jpg,.jpeg,.gif\">\n\
         <button type=\"submit\">Analyze</button>\n</form>\n",
    );
    page("Face Emotion Detector", &body)
}

/// Original and annotated images plus one line per detected face.
pub fn results_page(report: &AnalysisReport) -> String {
    let mut body = String::from("<h1>Results</h1>\n");
    if let Some(message) = &report.message {
        let _ = writeln!(body, "<p class=\"message\">{}</p>", escape_html(message));
    }

    body.push_str("<div class=\"images\">\n");
    let _ = writeln!(
        body,
        "<figure><img src=\"{}\" alt=\"original\"><figcaption>Original</figcaption></figure>",
        image_url(&report.original_image)
    );
    if let Some(processed) = &report.processed_image {
        let _ = writeln!(
            body,
            "<figure><img src=\"{}\" alt=\"annotated\"><figcaption>Annotated</figcaption></figure>",
            image_url(processed)
        );
    }
    body.push_str("</div>\n");

    if !report.results.is_empty() {
        body.push_str("<ol class=\"faces\">\n");
        for face in &report.results {
            let b = face.bbox;
            let _ = writeln!(
                body,
                "<li><strong>{}</strong> at [{}, {}, {}, {}]</li>",
                escape_html(&face.emotion),
                b.x,
                b.y,
                b.width,
                b.height
            );
        }
        body.push_str("</ol>\n");
    }

    body.push_str("<p><a href=\"/\">Analyze another image</a></p>\n");
    page("Results", &body)
}
