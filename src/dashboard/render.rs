//! HTML for the dashboard page.

use crate::dashboard::session::{Flash, FlashLevel};
use crate::payload::Record;
use crate::results_grid::ResultsGrid;

const STYLE: &str = "body{font-family:sans-serif;margin:2em;max-width:1100px}\
section{margin-bottom:2em}\
table.grid{border-collapse:collapse;font-size:0.9em}\
table.grid th,table.grid td{border:1px solid #ccc;padding:2px 6px}\
td.num{text-align:right}td.null{color:#999}\
.flash{padding:0.5em 1em;border-radius:4px}\
.flash.info{background:#e6f4ea}.flash.error{background:#fce8e6}";

/// Escapes text for use in HTML element content and attribute values.
pub fn escape(text: &str) -> String {
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

/// Percent-encodes a query string component.
pub fn encode_component(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for b in text.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

/// Everything the page shows for one request.
#[derive(Debug, Default)]
pub struct PageView<'a> {
    pub tables: &'a [String],
    pub selected: Option<&'a str>,
    pub grid: Option<ResultsGrid>,
    pub plot_columns: Vec<String>,
    pub plot: Option<&'a str>,
    pub plot_svg: Option<String>,
    pub last_row: Option<Record>,
    pub upload_name: Option<&'a str>,
    pub upload_grid: Option<ResultsGrid>,
    pub flash: Option<Flash>,
}

fn options<'a>(items: impl IntoIterator<Item = &'a str>, selected: Option<&str>) -> String {
    items
        .into_iter()
        .map(|item| {
            let mark = if Some(item) == selected { " selected" } else { "" };
            format!(
                "<option value=\"{0}\"{1}>{0}</option>",
                escape(item),
                mark
            )
        })
        .collect()
}

fn page_link(view: &PageView<'_>, offset: usize) -> String {
    let mut href = format!("/?offset={}", offset);
    if let Some(table) = view.selected {
        href.push_str(&format!("&table={}", encode_component(table)));
    }
    if let Some(plot) = view.plot {
        href.push_str(&format!("&plot={}", encode_component(plot)));
    }
    escape(&href)
}

fn render_flash(flash: &Flash) -> String {
    let class = match flash.level {
        FlashLevel::Info => "info",
        FlashLevel::Error => "error",
    };
    format!(
        "<p class=\"flash {}\">{}</p>\n",
        class,
        escape(&flash.message)
    )
}

fn render_table_section(view: &PageView<'_>) -> String {
    let mut out = String::from("<section id=\"view\">\n<h2>Tables</h2>\n");
    out.push_str("<form method=\"get\" action=\"/\">\n");
    out.push_str(&format!(
        "<label>Table <select name=\"table\" onchange=\"this.form.submit()\">{}</select></label>\n",
        options(view.tables.iter().map(String::as_str), view.selected)
    ));
    if !view.plot_columns.is_empty() {
        out.push_str(&format!(
            "<label>Plot column <select name=\"plot\"><option value=\"\">(none)</option>{}</select></label>\n",
            options(view.plot_columns.iter().map(String::as_str), view.plot)
        ));
    }
    out.push_str("<button type=\"submit\">Show</button>\n</form>\n");
    out.push_str(
        "<form method=\"post\" action=\"/refresh\"><button type=\"submit\">Refresh table list</button></form>\n",
    );

    if let Some(grid) = &view.grid {
        out.push_str(&format!("<p>{}</p>\n", escape(&grid.caption())));
        out.push_str(&grid.render_html());
        let total = grid.total_rows();
        if let Some(prev) = grid.viewport.prev_offset() {
            out.push_str(&format!("<a href=\"{}\">Previous</a> ", page_link(view, prev)));
        }
        if let Some(next) = grid.viewport.next_offset(total) {
            out.push_str(&format!("<a href=\"{}\">Next</a>", page_link(view, next)));
        }
    } else if view.tables.is_empty() {
        out.push_str("<p>No tables yet.</p>\n");
    }

    if let Some(svg) = &view.plot_svg {
        out.push_str("<div class=\"plot\">\n");
        out.push_str(svg);
        out.push_str("</div>\n");
    }

    if let Some(record) = &view.last_row {
        out.push_str("<h3>Latest row</h3>\n<dl>\n");
        for (name, value) in &record.fields {
            out.push_str(&format!(
                "<dt>{}</dt><dd>{}</dd>\n",
                escape(name),
                escape(&value.to_string())
            ));
        }
        out.push_str("</dl>\n");
    }
    out.push_str("</section>\n");
    out
}

fn render_upload_section(view: &PageView<'_>) -> String {
    let mut out = String::from("<section id=\"upload\">\n<h2>Upload CSV</h2>\n");
    out.push_str(
        "<form method=\"post\" action=\"/upload\" enctype=\"multipart/form-data\">\
         <input type=\"file\" name=\"file\" accept=\".csv,text/csv\"> \
         <button type=\"submit\">Upload</button></form>\n",
    );
    if let (Some(name), Some(grid)) = (view.upload_name, &view.upload_grid) {
        out.push_str(&format!(
            "<p>Preview of {} ({})</p>\n",
            escape(name),
            escape(&grid.caption())
        ));
        out.push_str(&grid.render_html());
    }
    out.push_str(
        "<form method=\"post\" action=\"/save\">\
         <label>New table name <input type=\"text\" name=\"table_name\"></label> \
         <select name=\"mode\">\
         <option value=\"create\">Create table</option>\
         <option value=\"append\">Append to existing table</option>\
         </select> \
         <button type=\"submit\">Save</button></form>\n",
    );
    out.push_str("</section>\n");
    out
}

fn render_delete_section(view: &PageView<'_>) -> String {
    format!(
        "<section id=\"delete\">\n<h2>Delete table</h2>\n\
         <form method=\"post\" action=\"/delete\">\
         <select name=\"table\"><option value=\"\"></option>{}</select> \
         <button type=\"submit\">Delete</button></form>\n</section>\n",
        options(view.tables.iter().map(String::as_str), None)
    )
}

/// Renders the whole dashboard page.
pub fn page(view: &PageView<'_>) -> String {
    let mut out = String::from("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    out.push_str("<title>tabledash</title>\n");
    out.push_str(&format!("<style>{}</style>\n", STYLE));
    out.push_str("</head>\n<body>\n<h1>tabledash</h1>\n");
    if let Some(flash) = &view.flash {
        out.push_str(&render_flash(flash));
    }
    out.push_str(&render_table_section(view));
    out.push_str(&render_upload_section(view));
    out.push_str(&render_delete_section(view));
    out.push_str("</body>\n</html>\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape() {
        assert_eq!(escape("<a href=\"x\">&'"), "&lt;a href=&quot;x&quot;&gt;&amp;&#39;");
    }

    #[test]
    fn test_encode_component() {
        assert_eq!(encode_component("cnc data&1"), "cnc%20data%261");
        assert_eq!(encode_component("plain_name"), "plain_name");
    }

    #[test]
    fn test_page_lists_tables_and_selection() {
        let tables = vec!["alpha".to_string(), "demo".to_string()];
        let view = PageView {
            tables: &tables,
            selected: Some("demo"),
            flash: Some(Flash::error("Enter a name for the table")),
            ..Default::default()
        };
        let html = page(&view);
        assert!(html.contains("<option value=\"demo\" selected>demo</option>"));
        assert!(html.contains("<option value=\"alpha\">alpha</option>"));
        assert!(html.contains("class=\"flash error\">Enter a name for the table"));
        assert!(html.contains("action=\"/upload\""));
        assert!(html.contains("name=\"table_name\""));
        assert!(html.contains("action=\"/delete\""));
    }

    #[test]
    fn test_empty_page() {
        let html = page(&PageView::default());
        assert!(html.contains("No tables yet."));
        assert!(!html.contains("class=\"flash"));
    }
}
