/// `kind`/`type` value that marks the end of a turn.
pub const COMPLETE_KIND: &str = "complete";

/// Frame received from the gateway.
///
/// Every field is optional. Gateways differ in whether they tag frames with
/// `kind` or `type` and whether the fragment lives in `text` or `content`,
/// so both spellings are accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct InboundFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    kind: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    type_: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    done: Option<bool>,
}

impl InboundFrame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses one text payload. Anything that is not a JSON object with the
    /// expected field types is an error.
    pub fn from_json(payload: &str) -> serde_json::Result<Self> {
        serde_json::from_str(payload)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn with_kind(mut self, kind: &str) -> Self {
        self.kind = Some(kind.to_string());
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = Some(text.to_string());
        self
    }

    pub fn with_content(mut self, content: &str) -> Self {
        self.content = Some(content.to_string());
        self
    }

    pub fn with_done(mut self, done: bool) -> Self {
        self.done = Some(done);
        self
    }

    /// The frame tag, preferring `kind` over `type`.
    pub fn kind(&self) -> Option<&str> {
        self.kind.as_deref().or(self.type_.as_deref())
    }

    /// The response fragment carried by this frame, if any.
    ///
    /// A non-empty `text` wins over `content`.
    pub fn response_text(&self) -> Option<&str> {
        self.text
            .as_deref()
            .filter(|t| !t.is_empty())
            .or_else(|| self.content.as_deref().filter(|c| !c.is_empty()))
    }

    /// True when the frame ends the turn, either through `done: true` or a
    /// `complete` tag in `kind` or `type`.
    pub fn is_done(&self) -> bool {
        self.done == Some(true)
            || self.kind.as_deref() == Some(COMPLETE_KIND)
            || self.type_.as_deref() == Some(COMPLETE_KIND)
    }

    /// A frame with no fragment and no completion signal changes nothing.
    pub fn is_inert(&self) -> bool {
        self.response_text().is_none() && !self.is_done()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_takes_precedence_over_content() {
        let frame = InboundFrame::from_json(r#"{"text":"a","content":"b"}"#).unwrap();
        assert_eq!(frame.response_text(), Some("a"));

        let frame = InboundFrame::from_json(r#"{"type":"response","content":"b"}"#).unwrap();
        assert_eq!(frame.response_text(), Some("b"));
        assert_eq!(frame.kind(), Some("response"));
    }

    #[test]
    fn empty_text_falls_back_to_content() {
        let frame = InboundFrame::from_json(r#"{"text":"","content":"b"}"#).unwrap();
        assert_eq!(frame.response_text(), Some("b"));
    }

    #[test]
    fn completion_is_signalled_by_flag_or_tag() {
        assert!(InboundFrame::from_json(r#"{"text":"hi there","done":true}"#).unwrap().is_done());
        assert!(InboundFrame::from_json(r#"{"type":"complete"}"#).unwrap().is_done());
        assert!(InboundFrame::from_json(r#"{"kind":"complete"}"#).unwrap().is_done());
        assert!(
            InboundFrame::from_json(r#"{"kind":"response","type":"complete","text":"bye"}"#)
                .unwrap()
                .is_done()
        );
        assert!(!InboundFrame::from_json(r#"{"text":"x","done":false}"#).unwrap().is_done());
    }

    #[test]
    fn frame_without_text_or_done_is_inert() {
        assert!(InboundFrame::from_json("{}").unwrap().is_inert());
        assert!(InboundFrame::from_json(r#"{"kind":"typing"}"#).unwrap().is_inert());
        assert!(!InboundFrame::new().with_text("x").is_inert());
    }

    #[test]
    fn non_object_payloads_are_rejected() {
        assert!(InboundFrame::from_json("not json").is_err());
        assert!(InboundFrame::from_json("42").is_err());
        assert!(InboundFrame::from_json(r#"{"text":5}"#).is_err());
    }
}
