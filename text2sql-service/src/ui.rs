//! 页面渲染
//!
//! Server-rendered single page: question form, generated SQL with keyword
//! highlighting, and one block per result line.

use common::models::ask::AskResponse;
use common::models::query::ExecutionOutcome;

/// What the page shows below the form.
pub enum PageResult<'a> {
    /// SQL was generated and executed.
    Answer(&'a AskResponse),
    /// The model call failed; nothing was executed.
    GenerationError(&'a str),
}

const SQL_KEYWORDS: &[&str] = &[
    "ALL", "ALTER", "AND", "AS", "ASC", "AVG", "BETWEEN", "BY", "CASE", "COUNT", "CREATE",
    "DELETE", "DESC", "DISTINCT", "DROP", "ELSE", "END", "EXISTS", "FROM", "FULL", "GROUP",
    "HAVING", "ILIKE", "IN", "INNER", "INSERT", "INTO", "IS", "JOIN", "LEFT", "LIKE", "LIMIT",
    "MAX", "MIN", "NOT", "NULL", "OFFSET", "ON", "OR", "ORDER", "OUTER", "RETURNING", "RIGHT",
    "SELECT", "SET", "SUM", "TABLE", "THEN", "TRUNCATE", "UNION", "UPDATE", "VALUES", "WHEN",
    "WHERE", "WITH",
];

const STYLE: &str = r#"
body { font-family: system-ui, sans-serif; max-width: 860px; margin: 2rem auto; padding: 0 1rem; color: #1f2933; }
form { display: flex; gap: .5rem; }
input[type=text] { flex: 1; padding: .5rem; font-size: 1rem; }
button { padding: .5rem 1rem; font-size: 1rem; }
pre.sql { background: #f5f7fa; padding: 1rem; border-radius: 6px; overflow-x: auto; }
.kw { color: #0b57d0; font-weight: 600; }
.str { color: #b3261e; }
.num { color: #146c2e; }
.comment { color: #6b7280; font-style: italic; }
.line { font-family: ui-monospace, monospace; padding: .25rem .5rem; border-bottom: 1px solid #e5e7eb; }
.failed { color: #b3261e; }
.acknowledged { color: #146c2e; }
.error { background: #fdecea; padding: 1rem; border-radius: 6px; }
#thinking { display: none; color: #6b7280; }
"#;

const SCRIPT: &str = r#"
document.getElementById('ask').addEventListener('submit', function () {
  document.getElementById('run').disabled = true;
  document.getElementById('thinking').style.display = 'block';
});
"#;

/// Renders the full page.
pub fn render_page(question: &str, result: Option<PageResult<'_>>) -> String {
    let mut body = String::new();
    body.push_str("<h1>🧠 Natural Language to SQL - PostgreSQL Chat Assistant</h1>\n");
    body.push_str(&format!(
        "<form id=\"ask\" method=\"post\" action=\"/\">\n\
         <label for=\"question\">💬 Ask a question:</label>\n\
         <input type=\"text\" id=\"question\" name=\"question\" value=\"{}\" autofocus>\n\
         <button id=\"run\" type=\"submit\">Run Query</button>\n\
         </form>\n\
         <p id=\"thinking\">🧠 Thinking... Generating SQL...</p>\n",
        escape_html(question)
    ));

    match result {
        Some(PageResult::Answer(answer)) => {
            body.push_str("<h2>🔍 Generated SQL Query:</h2>\n");
            body.push_str(&format!("<pre class=\"sql\"><code>{}</code></pre>\n", highlight_sql(&answer.sql)));
            body.push_str("<h2>📊 Query Results:</h2>\n");
            body.push_str(&render_outcome(&answer.outcome));
            body.push_str(&format!(
                "<p><small>{} ms</small></p>\n",
                answer.execution_time_ms
            ));
        }
        Some(PageResult::GenerationError(message)) => {
            body.push_str(&format!(
                "<div class=\"error\">Could not generate SQL: {}</div>\n",
                escape_html(message)
            ));
        }
        None => {}
    }

    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>Text-to-SQL (PostgreSQL)</title>\n<style>{}</style>\n</head>\n\
         <body>\n{}<script>{}</script>\n</body>\n</html>\n",
        STYLE, body, SCRIPT
    )
}

fn render_outcome(outcome: &ExecutionOutcome) -> String {
    let class = match outcome {
        ExecutionOutcome::Rows { .. } => "rows",
        ExecutionOutcome::Acknowledged { .. } => "acknowledged",
        ExecutionOutcome::Failed { .. } => "failed",
    };

    let mut html = format!("<div class=\"results {}\">\n", class);
    if let ExecutionOutcome::Rows { columns, .. } = outcome {
        let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
        html.push_str(&format!(
            "<div class=\"columns\"><small>{}</small></div>\n",
            escape_html(&names.join(", "))
        ));
    }
    for line in outcome.display_lines() {
        html.push_str(&format!("<div class=\"line\">{}</div>\n", escape_html(&line)));
    }
    html.push_str("</div>\n");
    html
}

/// Escapes text for use in HTML content and attribute values.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Returns escaped HTML with keywords, string literals, numbers and `--`
/// comments wrapped in `<span>`s.
pub fn highlight_sql(sql: &str) -> String {
    let chars: Vec<char> = sql.chars().collect();
    let mut out = String::with_capacity(sql.len() * 2);
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let start = i;

        if c == '-' && chars.get(i + 1) == Some(&'-') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            push_span(&mut out, "comment", &chars[start..i]);
        } else if c == '\'' {
            i += 1;
            while i < chars.len() {
                if chars[i] == '\'' {
                    // '' is an escaped quote inside the literal
                    if chars.get(i + 1) == Some(&'\'') {
                        i += 2;
                        continue;
                    }
                    i += 1;
                    break;
                }
                i += 1;
            }
            push_span(&mut out, "str", &chars[start..i]);
        } else if c.is_ascii_digit() {
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            push_span(&mut out, "num", &chars[start..i]);
        } else if c.is_alphabetic() || c == '_' {
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            if SQL_KEYWORDS.contains(&word.to_ascii_uppercase().as_str()) {
                push_span(&mut out, "kw", &chars[start..i]);
            } else {
                out.push_str(&escape_html(&word));
            }
        } else {
            out.push_str(&escape_html(c.encode_utf8(&mut [0; 4])));
            i += 1;
        }
    }
    out
}

fn push_span(out: &mut String, class: &str, text: &[char]) {
    let text: String = text.iter().collect();
    out.push_str(&format!("<span class=\"{}\">{}</span>", class, escape_html(&text)));
}
