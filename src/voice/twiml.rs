//! Voice document builder (the TwiML subset the call flow emits).

use std::fmt;

pub const XML_PROLOG: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

#[derive(Debug, Clone, PartialEq)]
pub struct Gather {
    pub action: String,
    pub timeout_secs: u32,
    pub prompts: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verb {
    Say(String),
    Gather(Gather),
    Redirect(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VoiceResponse {
    verbs: Vec<Verb>,
}

impl VoiceResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn say(mut self, text: impl Into<String>) -> Self {
        self.verbs.push(Verb::Say(text.into()));
        self
    }

    /// Speech gather posting to `action`, speaking `prompt` while listening.
    pub fn gather(
        mut self,
        action: impl Into<String>,
        timeout_secs: u32,
        prompt: impl Into<String>,
    ) -> Self {
        self.verbs.push(Verb::Gather(Gather {
            action: action.into(),
            timeout_secs,
            prompts: vec![prompt.into()],
        }));
        self
    }

    pub fn redirect(mut self, url: impl Into<String>) -> Self {
        self.verbs.push(Verb::Redirect(url.into()));
        self
    }

    /// Every spoken line in document order, including prompts nested in gathers.
    pub fn spoken(&self) -> Vec<&str> {
        self.verbs
            .iter()
            .flat_map(|v| match v {
                Verb::Say(text) => vec![text.as_str()],
                Verb::Gather(g) => g.prompts.iter().map(String::as_str).collect(),
                Verb::Redirect(_) => vec![],
            })
            .collect()
    }

    /// Target of the trailing redirect, if the document continues the call.
    pub fn redirect_target(&self) -> Option<&str> {
        self.verbs.iter().rev().find_map(|v| match v {
            Verb::Redirect(url) => Some(url.as_str()),
            _ => None,
        })
    }

    pub fn gather_action(&self) -> Option<&str> {
        self.verbs.iter().find_map(|v| match v {
            Verb::Gather(g) => Some(g.action.as_str()),
            _ => None,
        })
    }

    /// A document with no gather and no redirect ends the call.
    pub fn is_terminal(&self) -> bool {
        !self
            .verbs
            .iter()
            .any(|v| matches!(v, Verb::Gather(_) | Verb::Redirect(_)))
    }

    pub fn to_xml(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for VoiceResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(XML_PROLOG)?;
        f.write_str("<Response>")?;
        for verb in &self.verbs {
            match verb {
                Verb::Say(text) => write!(f, "<Say>{}</Say>", escape(text))?,
                Verb::Gather(g) => {
                    write!(
                        f,
                        r#"<Gather input="speech" timeout="{}" speechTimeout="auto" action="{}" method="POST">"#,
                        g.timeout_secs,
                        escape(&g.action)
                    )?;
                    for prompt in &g.prompts {
                        write!(f, "<Say>{}</Say>", escape(prompt))?;
                    }
                    f.write_str("</Gather>")?;
                }
                Verb::Redirect(url) => {
                    write!(f, r#"<Redirect method="POST">{}</Redirect>"#, escape(url))?
                }
            }
        }
        f.write_str("</Response>")
    }
}

/// Escape text for XML content and attribute values.
pub fn escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
