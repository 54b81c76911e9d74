//! `tabzone ls`: tracked tabs grouped by window.

use crate::client::rpc_call;

/// Entry point for `tabzone ls`.
pub async fn cmd_ls(socket_path: &str, window: Option<u64>) -> anyhow::Result<()> {
    let params = match window {
        Some(w) => serde_json::json!({ "window_id": w }),
        None => serde_json::json!({}),
    };
    let items = rpc_call(socket_path, "list_items", params).await?;
    let arr = items.as_array().cloned().unwrap_or_default();

    let output = format_ls(&arr);
    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}

fn status_label(item: &serde_json::Value) -> &str {
    if item["pinned"].as_bool() == Some(true) {
        return "pinned";
    }
    item["status"].as_str().unwrap_or("-")
}

/// Items arrive ordered by window; one header per window.
pub(crate) fn format_ls(items: &[serde_json::Value]) -> String {
    let mut lines = Vec::new();
    let mut current_window = None;

    for item in items {
        let window = item["window_id"].as_u64();
        if window != current_window {
            current_window = window;
            lines.push(format!("window {}", window.unwrap_or(0)));
        }

        let group = match (item["group_id"].as_u64(), item["in_state_group"].as_bool()) {
            (Some(g), Some(true)) => format!("[{g}*]"),
            (Some(g), _) => format!("[{g}]"),
            (None, _) => String::new(),
        };
        lines.push(format!(
            "  {:>6}  {:<8} {:<7} {}",
            item["id"].as_u64().unwrap_or(0),
            status_label(item),
            group,
            item["url"].as_str().unwrap_or("")
        ));
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: u64, window: u64, status: &str, group: Option<u64>, reserved: bool) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "window_id": window,
            "status": status,
            "group_id": group,
            "in_state_group": reserved,
            "pinned": false,
            "url": format!("https://t{id}.test/"),
        })
    }

    #[test]
    fn empty_list_prints_nothing() {
        assert_eq!(format_ls(&[]), "");
    }

    #[test]
    fn groups_by_window_and_marks_reserved() {
        let items = vec![
            item(1, 1, "fresh", None, false),
            item(2, 1, "aging", Some(7), true),
            item(3, 2, "stale", Some(9), false),
        ];
        let out = format_ls(&items);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "window 1");
        assert!(lines[2].contains("aging") && lines[2].contains("[7*]"));
        assert_eq!(lines[3], "window 2");
        assert!(lines[4].contains("[9]") && !lines[4].contains('*'));
    }

    #[test]
    fn pinned_items_show_pinned() {
        let mut pinned = item(4, 1, "fresh", None, false);
        pinned["pinned"] = serde_json::json!(true);
        pinned["status"] = serde_json::Value::Null;
        assert!(format_ls(&[pinned]).contains("pinned"));
    }
}
