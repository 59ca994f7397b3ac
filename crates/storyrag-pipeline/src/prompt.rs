//! Story prompt template with `{name}`, `{age}`, `{situation}`,
//! `{preferences}`, `{triggers}` and `{context}` placeholders.
//!
//! Substitution is a single pass over the parsed template, so braces inside
//! field values are never expanded.

use storyrag_core::types::Personalization;
use storyrag_core::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Name,
    Age,
    Situation,
    Preferences,
    Triggers,
    Context,
}

impl Field {
    fn parse(key: &str) -> Option<Self> {
        Some(match key {
            "name" => Field::Name,
            "age" => Field::Age,
            "situation" => Field::Situation,
            "preferences" => Field::Preferences,
            "triggers" => Field::Triggers,
            "context" => Field::Context,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(Field),
}

#[derive(Debug, Clone)]
pub struct PromptTemplate {
    segments: Vec<Segment>,
}

impl PromptTemplate {
    /// Parse a template. Unknown `{identifier}` placeholders are rejected;
    /// other braces are kept literally.
    pub fn new(template: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = template;
        while let Some(open) = rest.find('{') {
            literal.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let key_len = after.find(|c: char| !(c.is_ascii_alphanumeric() || c == '_')).unwrap_or(after.len());
            let key = &after[..key_len];
            if key_len > 0 && after[key_len..].starts_with('}') {
                let field = Field::parse(key).ok_or_else(|| Error::InvalidConfig(format!("unknown template placeholder {{{key}}}")))?;
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Field(field));
                rest = &after[key_len + 1..];
            } else {
                literal.push('{');
                rest = after;
            }
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        if !segments.contains(&Segment::Field(Field::Situation)) {
            return Err(Error::InvalidConfig("template must reference {situation}".into()));
        }
        Ok(Self { segments })
    }

    pub fn uses_context(&self) -> bool {
        self.segments.contains(&Segment::Field(Field::Context))
    }

    pub fn render(&self, fields: &Personalization, context: &str) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(Field::Name) => out.push_str(&fields.name),
                Segment::Field(Field::Age) => out.push_str(&fields.age),
                Segment::Field(Field::Situation) => out.push_str(&fields.situation),
                Segment::Field(Field::Preferences) => out.push_str(&fields.preferences),
                Segment::Field(Field::Triggers) => out.push_str(&fields.triggers),
                Segment::Field(Field::Context) => out.push_str(context),
            }
        }
        out
    }
}

/// `situation` must be non-empty; the other fields may be blank.
pub fn validate_fields(fields: &Personalization) -> Result<()> {
    if fields.situation.trim().is_empty() {
        return Err(Error::InvalidInput("situation must not be empty".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use storyrag_core::config::DEFAULT_TEMPLATE;

    fn alex() -> Personalization {
        Personalization {
            name: "Alex".into(),
            age: "6".into(),
            situation: "going to a new school".into(),
            preferences: "dinosaurs".into(),
            triggers: "loud noises".into(),
        }
    }

    #[test]
    fn default_template_matches_story_prompt() {
        let t = PromptTemplate::new(DEFAULT_TEMPLATE).unwrap();
        let prompt = t.render(&alex(), "School is a safe place.");
        assert_eq!(
            prompt,
            "<|startoftext|>This is a social story for a child named Alex about going to a new school.\n\nHere is the story:\nMy name is Alex. School is a safe place."
        );
        assert!(t.uses_context());
    }

    #[test]
    fn values_with_braces_are_not_expanded() {
        let t = PromptTemplate::new("{name} / {situation}").unwrap();
        let mut f = alex();
        f.name = "{situation}".into();
        assert_eq!(t.render(&f, ""), "{situation} / going to a new school");
    }

    #[test]
    fn literal_braces_survive_and_unknown_keys_fail() {
        let t = PromptTemplate::new("{ {situation} }{").unwrap();
        assert_eq!(t.render(&alex(), ""), "{ going to a new school }{");
        assert!(matches!(PromptTemplate::new("{situation} {mood}"), Err(Error::InvalidConfig(_))));
        assert!(matches!(PromptTemplate::new("no fields"), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn empty_situation_is_invalid() {
        let mut f = alex();
        f.situation = "   ".into();
        assert!(matches!(validate_fields(&f), Err(Error::InvalidInput(_))));
        assert!(validate_fields(&alex()).is_ok());
    }
}
