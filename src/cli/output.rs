use serde_json::Value;

const MAX_COL_WIDTH: usize = 60;

/// Render a command result for the terminal. Lists of records become an ASCII
/// table; anything else is pretty JSON. `WORKLOCUS_OUTPUT=json` forces JSON.
pub fn render(val: &Value) -> String {
    let force_json = std::env::var("WORKLOCUS_OUTPUT").map(|v| v.eq_ignore_ascii_case("json")).unwrap_or(false);
    if !force_json {
        if let Some(table) = render_table(val) {
            return table;
        }
    }
    serde_json::to_string_pretty(val).unwrap_or_else(|_| val.to_string())
}

/// Table for an array of objects (directly or under an envelope's `data`).
pub fn render_table(val: &Value) -> Option<String> {
    let rows = match val {
        Value::Array(arr) => arr,
        Value::Object(map) => match map.get("data") {
            Some(Value::Array(arr)) => arr,
            _ => return None,
        },
        _ => return None,
    };
    if rows.is_empty() { return None; }

    let mut cols: Vec<String> = Vec::new();
    for row in rows {
        let Value::Object(map) = row else { return None };
        for k in map.keys() {
            if !cols.contains(k) { cols.push(k.clone()); }
        }
    }
    if cols.is_empty() { return None; }
    cols.sort();

    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| cols.iter().map(|c| to_cell(row.get(c).unwrap_or(&Value::Null))).collect())
        .collect();

    let mut widths: Vec<usize> = cols.iter().map(|c| c.chars().count().min(MAX_COL_WIDTH)).collect();
    for r in &cells {
        for (i, cell) in r.iter().enumerate() {
            widths[i] = widths[i].max(cell.chars().count().min(MAX_COL_WIDTH));
        }
    }

    let sep = separator(&widths);
    let mut out = String::new();
    out.push_str(&sep);
    out.push('\n');
    out.push_str(&row_line(&cols, &widths));
    out.push('\n');
    out.push_str(&sep);
    out.push('\n');
    for r in &cells {
        out.push_str(&row_line(r, &widths));
        out.push('\n');
    }
    out.push_str(&sep);
    out.push('\n');
    out.push_str(&format!("rows: {}", cells.len()));
    Some(out)
}

fn to_cell(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn separator(widths: &[usize]) -> String {
    let mut s = String::from("+");
    for w in widths {
        s.push_str(&"-".repeat(w + 2));
        s.push('+');
    }
    s
}

fn row_line(cells: &[String], widths: &[usize]) -> String {
    let mut s = String::from("|");
    for (i, w) in widths.iter().enumerate() {
        let text = truncate(cells.get(i).map(String::as_str).unwrap_or(""), *w);
        let pad = w.saturating_sub(text.chars().count());
        s.push(' ');
        if is_numeric_like(&text) {
            s.push_str(&" ".repeat(pad));
            s.push_str(&text);
        } else {
            s.push_str(&text);
            s.push_str(&" ".repeat(pad));
        }
        s.push_str(" |");
    }
    s
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max { return s.to_string(); }
    if max <= 1 { return "…".to_string(); }
    s.chars().take(max - 1).collect::<String>() + "…"
}

fn is_numeric_like(s: &str) -> bool {
    let st = s.trim();
    !st.is_empty() && st.chars().any(|c| c.is_ascii_digit()) && st.chars().all(|c| c.is_ascii_digit() || ".-+eE,_".contains(c))
}
