//! HTML pages. Every dynamic value goes through [`escape`].

use std::fmt::Write as _;

use crate::db::{RowSet, TableDescriptor};
use crate::session::Flash;

pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

/// Percent-encode a table name for use as a single path segment.
pub fn path_segment(s: &str) -> String {
    urlencoding::encode(s).into_owned()
}

fn page(title: &str, flashes: &[Flash], body: &str) -> String {
    let mut notices = String::new();
    for f in flashes {
        let _ = write!(
            &mut notices,
            "<div class=\"flash {}\">{}</div>\n",
            f.category.as_str(),
            escape(&f.message)
        );
    }
    format!(
        "<!doctype html>\n<html>\n<head><meta charset=\"utf-8\"><title>{}</title></head>\n<body>\n{}{}\n</body>\n</html>\n",
        escape(title),
        notices,
        body
    )
}

/// Values echoed back into the login form after a failed attempt. The password is
/// never echoed.
#[derive(Debug, Clone, Default)]
pub struct LoginPrefill {
    pub host: String,
    pub port: String,
    pub dbname: String,
    pub user: String,
}

pub fn login_page(flashes: &[Flash], prefill: &LoginPrefill) -> String {
    let body = format!(
        "<h1>Connect to PostgreSQL</h1>\n\
         <form method=\"post\" action=\"/\">\n\
         <label>Host <input name=\"host\" value=\"{}\"></label>\n\
         <label>Port <input name=\"port\" value=\"{}\"></label>\n\
         <label>Database <input name=\"dbname\" value=\"{}\"></label>\n\
         <label>User <input name=\"user\" value=\"{}\"></label>\n\
         <label>Password <input name=\"password\" type=\"password\"></label>\n\
         <button type=\"submit\">Connect</button>\n\
         </form>",
        escape(&prefill.host),
        escape(&prefill.port),
        escape(&prefill.dbname),
        escape(&prefill.user)
    );
    page("Login", flashes, &body)
}

pub fn tables_page(flashes: &[Flash], tables: &[TableDescriptor]) -> String {
    let mut body = String::from("<h1>Tables</h1>\n");
    if tables.is_empty() {
        body.push_str("<p>No tables in schema <code>public</code>.</p>\n");
    } else {
        body.push_str("<ul>\n");
        for t in tables {
            let _ = writeln!(
                &mut body,
                "<li><a href=\"/table/{}\">{}</a></li>",
                escape(&path_segment(&t.name)),
                escape(&t.name)
            );
        }
        body.push_str("</ul>\n");
    }
    body.push_str("<p><a href=\"/logout\">Log out</a></p>");
    page("Tables", flashes, &body)
}

pub fn table_page(flashes: &[Flash], table: &str, rows: &RowSet) -> String {
    let mut body = format!("<h1>{}</h1>\n<table>\n<tr>", escape(table));
    for c in &rows.columns {
        let _ = write!(&mut body, "<th>{}</th>", escape(c));
    }
    body.push_str("</tr>\n");
    for row in &rows.rows {
        body.push_str("<tr>");
        for v in row {
            match v {
                Some(v) => { let _ = write!(&mut body, "<td>{}</td>", escape(v)); }
                None => body.push_str("<td class=\"null\">NULL</td>"),
            }
        }
        body.push_str("</tr>\n");
    }
    body.push_str("</table>\n<p><a href=\"/tables\">Back to tables</a> | <a href=\"/logout\">Log out</a></p>");
    page(table, flashes, &body)
}
