use tracing::warn;

/// A prompt with `{{name}}` placeholders.
pub struct PromptTemplate {
    template: &'static str,
}

impl PromptTemplate {
    pub const fn new(template: &'static str) -> Self {
        Self { template }
    }

    /// Replace every `{{key}}` with its value. Placeholders without a value are left in place.
    /// The template is scanned once, so placeholders inside inserted values stay literal.
    pub fn render(&self, vars: &[(&str, &str)]) -> String {
        let mut output = String::with_capacity(self.template.len());
        let mut rest = self.template;
        while let Some(start) = rest.find("{{") {
            output.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find("}}") else {
                output.push_str(&rest[start..]);
                rest = "";
                break;
            };
            let name = &after[..end];
            match vars.iter().find(|(key, _)| *key == name) {
                Some((_, value)) => output.push_str(value),
                None => {
                    if is_placeholder_name(name) {
                        warn!("Prompt placeholder {{{{{name}}}}} was not filled");
                    }
                    output.push_str(&rest[start..start + 2 + end + 2]);
                }
            }
            rest = &after[end + 2..];
        }
        output.push_str(rest);
        output
    }

    /// Names of all placeholders in the template, in order of appearance.
    pub fn placeholders(&self) -> Vec<&'static str> {
        placeholders(self.template)
    }
}

fn is_placeholder_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn placeholders(text: &str) -> Vec<&str> {
    let mut names = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else { break };
        let name = &after[..end];
        if is_placeholder_name(name) {
            names.push(name);
        }
        rest = &after[end + 2..];
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_all_occurrences() {
        let t = PromptTemplate::new("Hello {{name}}, welcome to {{place}}! Bye {{name}}.");
        assert_eq!(
            t.render(&[("name", "Alice"), ("place", "Wonderland")]),
            "Hello Alice, welcome to Wonderland! Bye Alice."
        );
    }

    #[test]
    fn leaves_unknown_placeholders() {
        let t = PromptTemplate::new("{{a}} and {{b}}");
        assert_eq!(t.render(&[("a", "x")]), "x and {{b}}");
        assert_eq!(t.placeholders(), vec!["a", "b"]);
    }

    #[test]
    fn values_are_not_expanded_again() {
        let t = PromptTemplate::new("{{a}}");
        assert_eq!(t.render(&[("a", "{{a}}"), ("b", "ignored")]), "{{a}}");
    }

    #[test]
    fn earlier_value_keeps_later_placeholder_literal() {
        let t = PromptTemplate::new("Search: {{search}}\nKeywords: {{keywords}}");
        assert_eq!(
            t.render(&[("search", "shoes {{keywords}}"), ("keywords", "[\"a\"]")]),
            "Search: shoes {{keywords}}\nKeywords: [\"a\"]"
        );
    }

    #[test]
    fn unterminated_braces_are_copied() {
        let t = PromptTemplate::new("{{a}} then {{ open");
        assert_eq!(t.render(&[("a", "x")]), "x then {{ open");
    }
}
