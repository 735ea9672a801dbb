use std::collections::HashMap;

use crate::domain::DomainError;

/// A prompt with named `{placeholder}` slots.
///
/// Rendering is a single left-to-right pass, so substituted values are never
/// re-scanned for placeholders (retrieved SQL often contains braces).
/// Unknown `{...}` sequences are kept verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptTemplate {
    name: String,
    text: String,
}

impl PromptTemplate {
    /// Fails with `DomainError::Config` if any of `required` is absent.
    pub fn parse(
        name: impl Into<String>,
        text: impl Into<String>,
        required: &[&str],
    ) -> Result<Self, DomainError> {
        let name = name.into();
        let text = text.into();
        let present = placeholders(&text);

        let missing: Vec<&str> = required
            .iter()
            .copied()
            .filter(|r| !present.iter().any(|p| p == r))
            .collect();

        if !missing.is_empty() {
            return Err(DomainError::config(format!(
                "template '{}' is missing placeholder(s): {}",
                name,
                missing
                    .iter()
                    .map(|m| format!("{{{m}}}"))
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }

        Ok(Self { name, text })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn has_placeholder(&self, key: &str) -> bool {
        placeholders(&self.text).iter().any(|p| p == key)
    }

    pub fn render(&self, values: &HashMap<&str, &str>) -> String {
        let mut out = String::with_capacity(self.text.len());
        let mut rest = self.text.as_str();

        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            match after.find('}') {
                Some(close) if is_identifier(&after[..close]) => {
                    let key = &after[..close];
                    match values.get(key) {
                        Some(value) => out.push_str(value),
                        None => {
                            out.push('{');
                            out.push_str(key);
                            out.push('}');
                        }
                    }
                    rest = &after[close + 1..];
                }
                _ => {
                    out.push('{');
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        out
    }
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn placeholders(text: &str) -> Vec<String> {
    let mut found = Vec::new();
    let mut rest = text;
    while let Some(open) = rest.find('{') {
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) if is_identifier(&after[..close]) => {
                found.push(after[..close].to_string());
                rest = &after[close + 1..];
            }
            _ => rest = after,
        }
    }
    found
}
