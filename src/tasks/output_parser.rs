//! Pull structured JSON out of free-form LLM output

use serde_json::Value;

/// Extract JSON from text.
///
/// Tried in order: a fenced ```json block, any fenced block, the whole
/// text, then the first balanced object or array embedded in prose.
pub fn extract_json(text: &str) -> Option<Value> {
    fenced_block(text, Some("json"))
        .or_else(|| fenced_block(text, None))
        .or_else(|| serde_json::from_str(text.trim()).ok())
        .or_else(|| embedded(text, '{', '}'))
        .or_else(|| embedded(text, '[', ']'))
}

fn fenced_block(text: &str, lang: Option<&str>) -> Option<Value> {
    let openers: Vec<String> = match lang {
        Some(lang) => vec![
            format!("```{}\n", lang),
            format!("```{}\r\n", lang),
            format!("```{} ", lang),
        ],
        None => vec!["```\n".into(), "```".into()],
    };

    openers.iter().find_map(|opener| {
        let start = text.find(opener.as_str())? + opener.len();
        let body = &text[start..];
        let end = body.find("```")?;
        serde_json::from_str(body[..end].trim()).ok()
    })
}

/// Parse the first balanced `open`..`close` span, skipping delimiters in strings
fn embedded(text: &str, open: char, close: char) -> Option<Value> {
    let start = text.find(open)?;
    let candidate = &text[start..];

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in candidate.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            _ if in_string => {}
            c if c == open => depth += 1,
            c if c == close => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return serde_json::from_str(&candidate[..i + c.len_utf8()]).ok();
                }
            }
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_from_json_block() {
        let text = "Here you go:\n\n```json\n{\"verdict\": \"approve\", \"score\": 9}\n```\n";
        let json = extract_json(text).unwrap();
        assert_eq!(json["verdict"], "approve");
        assert_eq!(json["score"], 9);
    }

    #[test]
    fn test_extract_from_generic_block() {
        let text = "```\n{\"key\": \"value\"}\n```";
        assert_eq!(extract_json(text).unwrap()["key"], "value");
    }

    #[test]
    fn test_extract_whole_text() {
        assert_eq!(extract_json(" [1, 2, 3] ").unwrap()[2], 3);
    }

    #[test]
    fn test_extract_embedded_object() {
        let text = r#"The result is {"action": "fix", "note": "use \"}\" carefully"} and that's it."#;
        let json = extract_json(text).unwrap();
        assert_eq!(json["action"], "fix");
    }

    #[test]
    fn test_extract_embedded_array() {
        let text = r#"Files: ["a.rs", "b.rs"] changed"#;
        let json = extract_json(text).unwrap();
        assert_eq!(json[1], "b.rs");
    }

    #[test]
    fn test_plain_text_has_no_json() {
        assert!(extract_json("nothing structured here").is_none());
    }
}
