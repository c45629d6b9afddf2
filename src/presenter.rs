//! Presenter: turns a session snapshot into the preview page.
//!
//! The fragment is placed verbatim inside the `.printable-content` region. The
//! print stylesheet hides everything else, including the controls and the print
//! button, so the browser's print dialog only sees the bookmark sheet.

use std::fmt::Write as _;

use crate::params::{Bounds, Dimension};
use crate::FailurePolicy;

/// Class of the preview region
pub const PREVIEW_CLASS: &str = "printable-content";

/// Rules applied while printing
pub const PRINT_CSS: &str = r#"
@media print {
  @page {
    margin: 0;
  }
  body * {
    visibility: hidden;
    margin: 0 !important;
    padding: 0 !important;
  }
  .printable-content, .printable-content * {
    visibility: visible;
  }
  .printable-content {
    box-shadow: none;
    border: none;
    position: absolute;
    left: 0;
    top: 0;
    width: 100%;
  }
  .controls {
    display: none !important;
  }
  button {
    display: none !important;
  }
}
"#;

const SCREEN_CSS: &str = r#"
.controls { margin-bottom: 20px; }
.controls input[type="range"] { width: 300px; margin: 10px 0; }
.controls select { font-size: 1rem; padding: 4px; margin-top: 4px; }
.printable-content { min-height: 400px; }
.print-trigger {
  position: fixed;
  top: 20px;
  left: 20px;
  padding: 10px 20px;
  font-size: 1rem;
  cursor: pointer;
  border-radius: 8px;
  border: 1px solid #333;
  background: #f2f2f2;
  box-shadow: 0 2px 6px rgba(0, 0, 0, 0.15);
  z-index: 1000;
}
"#;

const CLIENT_JS: &str = r#"
(function () {
  const preview = document.querySelector('.printable-content');
  let shown = window.FRAGMENT_TICKET || 0;
  if (window.FAILURE_ALERT && window.STARTUP_NOTICES.length > 0) {
    alert(window.STARTUP_NOTICES.join('\n'));
  }
  const call = (path, params) =>
    fetch(path + '?' + new URLSearchParams(params), { method: 'POST' }).then((res) => res.json());
  const apply = (reply) => {
    if (reply.error && window.FAILURE_ALERT) {
      alert(reply.error);
    }
    for (const [name, value] of Object.entries(reply.values || {})) {
      const input = document.querySelector('.controls input[name="' + name + '"]');
      if (input) {
        input.value = value;
        document.getElementById(name + '-value').textContent = value;
      }
    }
    return fetch('/api/fragment').then((res) => {
      const ticket = Number(res.headers.get('X-Fragment-Ticket') || 0);
      return res.text().then((html) => {
        // Reads can overlap; never go back to an older fragment
        if (ticket > shown) {
          shown = ticket;
          preview.innerHTML = html;
        }
      });
    });
  };
  document.querySelectorAll('.controls input[type="range"]').forEach((input) => {
    const output = document.getElementById(input.name + '-value');
    input.addEventListener('input', () => {
      output.textContent = input.value;
      call('/api/pending', { param: input.name, value: input.value });
    });
    input.addEventListener('change', () => {
      call('/api/commit', { param: input.name, value: input.value }).then(apply);
    });
  });
  document.querySelectorAll('.controls button[data-nudge]').forEach((button) => {
    button.addEventListener('click', () => {
      call('/api/nudge', { param: button.dataset.nudge, delta: button.dataset.delta }).then(apply);
    });
  });
  const year = document.querySelector('.controls select[name="year"]');
  year.addEventListener('change', () => call('/api/year', { value: year.value }).then(apply));
})();
"#;

/// One slider as shown to the user
#[derive(Debug, Clone, PartialEq)]
pub struct ControlView {
    pub dimension: Dimension,
    /// The pending value, which is what the control displays
    pub value: f64,
    pub bounds: Bounds,
}

/// Everything the presenter needs to draw the page
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewView {
    pub controls: Vec<ControlView>,
    pub year: String,
    pub year_options: Vec<String>,
    pub markup: String,
    /// Ticket of the fetch that produced `markup`, 0 before the first
    pub ticket: u64,
    /// Startup problems shown once under the alert policy
    pub notices: Vec<String>,
    pub failure_policy: FailurePolicy,
}

fn control_label(dim: Dimension) -> &'static str {
    match dim {
        Dimension::Width => "רוחב",
        Dimension::Height => "גובה",
        Dimension::Font => "גודל פונט",
    }
}

/// Escape text for use in HTML text nodes and quoted attributes
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

pub struct Presenter;

impl Presenter {
    /// Full interactive page: controls, preview region, print button.
    pub fn render_page(view: &PreviewView) -> String {
        let mut html = String::with_capacity(view.markup.len() + 8192);
        html.push_str("<!DOCTYPE html>\n<html lang=\"he\">\n<head>\n<meta charset=\"utf-8\">\n");
        html.push_str("<title>Bookmark preview</title>\n<style>");
        html.push_str(SCREEN_CSS);
        html.push_str(PRINT_CSS);
        html.push_str("</style>\n</head>\n<body>\n");

        html.push_str("<div dir=\"rtl\" class=\"controls\">\n");
        for control in &view.controls {
            Self::push_control(&mut html, control);
        }
        Self::push_year_select(&mut html, view);
        html.push_str("</div>\n");

        let _ = writeln!(html, "<div class=\"{}\">{}</div>", PREVIEW_CLASS, view.markup);
        html.push_str("<button type=\"button\" class=\"print-trigger\" onclick=\"window.print()\">🖨️ הדפס</button>\n");

        // Keep "</script>" inside a notice from closing the tag.
        let notices = serde_json::to_string(&view.notices)
            .unwrap_or_else(|_| "[]".to_string())
            .replace("</", "<\\/");
        let _ = writeln!(
            html,
            "<script>window.FAILURE_ALERT = {}; window.FRAGMENT_TICKET = {}; window.STARTUP_NOTICES = {};</script>",
            view.failure_policy == FailurePolicy::Alert,
            view.ticket,
            notices
        );
        html.push_str("<script>");
        html.push_str(CLIENT_JS);
        html.push_str("</script>\n</body>\n</html>\n");
        html
    }

    /// Standalone printable document holding only the preview region.
    pub fn render_document(markup: &str) -> String {
        let mut html = String::with_capacity(markup.len() + 1024);
        html.push_str("<!DOCTYPE html>\n<html lang=\"he\">\n<head>\n<meta charset=\"utf-8\">\n");
        html.push_str("<title>Bookmark</title>\n<style>");
        html.push_str(PRINT_CSS);
        html.push_str("</style>\n</head>\n<body>\n");
        let _ = writeln!(html, "<div class=\"{}\">{}</div>", PREVIEW_CLASS, markup);
        html.push_str("</body>\n</html>\n");
        html
    }

    fn push_control(html: &mut String, control: &ControlView) {
        let name = control.dimension.query_name();
        let b = control.bounds;
        let _ = write!(
            html,
            "<label>{}:<input type=\"range\" name=\"{}\" min=\"{}\" max=\"{}\" step=\"{}\" value=\"{}\"><output id=\"{}-value\">{}</output>",
            control_label(control.dimension),
            name,
            b.min,
            b.max,
            b.step,
            control.value,
            name,
            control.value,
        );
        if control.dimension == Dimension::Font {
            let _ = write!(
                html,
                "<button type=\"button\" data-nudge=\"{0}\" data-delta=\"-1\">−</button><button type=\"button\" data-nudge=\"{0}\" data-delta=\"1\">+</button>",
                name
            );
        }
        html.push_str("</label>\n<br>\n");
    }

    fn push_year_select(html: &mut String, view: &PreviewView) {
        html.push_str("<label>שנה:<select name=\"year\">");
        let mut options: Vec<&str> = view.year_options.iter().map(String::as_str).collect();
        if !view.year.is_empty() && !options.contains(&view.year.as_str()) {
            options.push(view.year.as_str());
        }
        for label in options {
            let selected = if label == view.year { " selected" } else { "" };
            let label = escape_html(label);
            let _ = write!(html, "<option value=\"{0}\"{1}>{0}</option>", label, selected);
        }
        html.push_str("</select></label>\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view() -> PreviewView {
        PreviewView {
            controls: Dimension::ALL
                .iter()
                .map(|d| ControlView {
                    dimension: *d,
                    value: d.default_value(),
                    bounds: d.bounds(),
                })
                .collect(),
            year: "התשפו".into(),
            year_options: vec!["התשפה".into(), "התשפו".into(), "התשפז".into()],
            markup: "<table class=\"bookmark\"><tr><td>בראשית א</td></tr></table>".into(),
            ticket: 4,
            notices: Vec::new(),
            failure_policy: FailurePolicy::Silent,
        }
    }

    #[test]
    fn fragment_is_embedded_verbatim() {
        let page = Presenter::render_page(&view());
        assert!(page.contains(
            "<div class=\"printable-content\"><table class=\"bookmark\"><tr><td>בראשית א</td></tr></table></div>"
        ));
    }

    #[test]
    fn sliders_carry_bounds() {
        let page = Presenter::render_page(&view());
        assert!(page.contains("name=\"width\" min=\"10\" max=\"30\" step=\"0.1\" value=\"21\""));
        assert!(page.contains("name=\"height\" min=\"10\" max=\"40\" step=\"0.1\" value=\"29.7\""));
        assert!(page.contains("name=\"font\" min=\"8\" max=\"48\" step=\"0.5\" value=\"15.7\""));
        assert!(page.contains("data-nudge=\"font\" data-delta=\"1\""));
    }

    #[test]
    fn year_select_marks_current() {
        let page = Presenter::render_page(&view());
        assert!(page.contains("<option value=\"התשפו\" selected>התשפו</option>"));
        assert!(page.contains("<option value=\"התשפה\">התשפה</option>"));

        let mut v = view();
        v.year = "התשצ".into();
        let page = Presenter::render_page(&v);
        assert!(page.contains("<option value=\"התשצ\" selected>"));
    }

    #[test]
    fn alert_policy_is_exposed_to_client() {
        let mut v = view();
        assert!(Presenter::render_page(&v).contains("window.FAILURE_ALERT = false;"));
        v.failure_policy = FailurePolicy::Alert;
        assert!(Presenter::render_page(&v).contains("window.FAILURE_ALERT = true;"));
    }

    #[test]
    fn client_state_is_embedded() {
        let mut v = view();
        v.notices = vec!["Next year: </script>".into()];
        let page = Presenter::render_page(&v);
        assert!(page.contains("window.FRAGMENT_TICKET = 4;"));
        assert!(page.contains(r#"window.STARTUP_NOTICES = ["Next year: <\/script>"];"#));
        assert!(page.contains("X-Fragment-Ticket"));
        assert!(page.contains("if (ticket > shown)"));
    }

    #[test]
    fn document_has_no_controls() {
        let doc = Presenter::render_document("<p>x</p>");
        assert!(doc.contains("<div class=\"printable-content\"><p>x</p></div>"));
        assert!(!doc.contains("<button"));
        assert!(!doc.contains("<input"));
        assert!(doc.contains("@media print"));
    }

    #[test]
    fn escapes_attribute_text() {
        assert_eq!(escape_html("<a href=\"x\">&'"), "&lt;a href=&quot;x&quot;&gt;&amp;&#39;");
    }
}
