//! SSML document builder for the `ssml` request frame.
//!
//! ```rust,ignore
//! let ssml = SsmlBuilder::new("en-US-JennyNeural")
//!     .rate("+10%")
//!     .style("cheerful")
//!     .build("Hello & welcome");
//! ```

const SSML_NAMESPACE: &str = "http://www.w3.org/2001/10/synthesis";
const MSTTS_NAMESPACE: &str = "https://www.w3.org/2001/mstts";

/// Voice used when none is configured.
pub const DEFAULT_VOICE: &str = "en-US-JennyNeural";

/// Builds a single-voice SSML document around plain text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsmlBuilder {
    voice: String,
    lang: Option<String>,
    rate: Option<String>,
    pitch: Option<String>,
    volume: Option<String>,
    style: Option<String>,
}

impl Default for SsmlBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_VOICE)
    }
}

impl SsmlBuilder {
    pub fn new(voice: impl Into<String>) -> Self {
        Self {
            voice: voice.into(),
            lang: None,
            rate: None,
            pitch: None,
            volume: None,
            style: None,
        }
    }

    /// Override `xml:lang`; by default it is taken from the voice short name.
    pub fn lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = Some(lang.into());
        self
    }

    /// Speaking rate, e.g. `"+20%"`, `"slow"` or `"1.2"`.
    pub fn rate(mut self, rate: impl Into<String>) -> Self {
        self.rate = Some(rate.into());
        self
    }

    pub fn pitch(mut self, pitch: impl Into<String>) -> Self {
        self.pitch = Some(pitch.into());
        self
    }

    pub fn volume(mut self, volume: impl Into<String>) -> Self {
        self.volume = Some(volume.into());
        self
    }

    /// Speaking style wrapped in `<mstts:express-as>`, e.g. `"cheerful"`.
    pub fn style(mut self, style: impl Into<String>) -> Self {
        self.style = Some(style.into());
        self
    }

    /// Language tag written into the document.
    pub fn effective_lang(&self) -> String {
        if let Some(lang) = &self.lang {
            return lang.clone();
        }
        // "en-US-JennyNeural" -> "en-US"
        let mut parts = self.voice.splitn(3, '-');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(language), Some(region), Some(_)) => format!("{language}-{region}"),
            _ => "en-US".to_string(),
        }
    }

    pub fn build(&self, text: &str) -> String {
        let mut body = escape_xml(text);

        let mut prosody_attrs = String::new();
        for (name, value) in [
            ("rate", &self.rate),
            ("pitch", &self.pitch),
            ("volume", &self.volume),
        ] {
            if let Some(value) = value {
                prosody_attrs.push_str(&format!(" {name}=\"{}\"", escape_xml(value)));
            }
        }
        if !prosody_attrs.is_empty() {
            body = format!("<prosody{prosody_attrs}>{body}</prosody>");
        }

        if let Some(style) = &self.style {
            body = format!(
                "<mstts:express-as style=\"{}\">{body}</mstts:express-as>",
                escape_xml(style)
            );
        }

        format!(
            "<speak version=\"1.0\" xmlns=\"{SSML_NAMESPACE}\" xmlns:mstts=\"{MSTTS_NAMESPACE}\" xml:lang=\"{}\"><voice name=\"{}\">{body}</voice></speak>",
            escape_xml(&self.effective_lang()),
            escape_xml(&self.voice)
        )
    }
}

/// Escape XML special characters.
pub fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Heuristic: does the input already look like an SSML document?
pub fn looks_like_ssml(input: &str) -> bool {
    input.trim_start().starts_with("<speak")
}
