//! Broadcast message

/// The message sent to every recipient of a broadcast.
///
/// Built once and shared read-only by all send attempts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    subject: String,
    body_text: String,
    body_html: String,
}

impl Message {
    /// Create a message from a subject and both body alternatives
    pub fn new(
        subject: impl Into<String>,
        body_text: impl Into<String>,
        body_html: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            body_text: body_text.into(),
            body_html: body_html.into(),
        }
    }

    /// Create a message whose HTML alternative is derived from the plain text:
    /// each line is escaped and line breaks become `<br/>`.
    pub fn from_plain_text(subject: impl Into<String>, body_text: impl Into<String>) -> Self {
        let body_text = body_text.into();

        let body_html = body_text
            .lines()
            .map(html_escape::encode_text)
            .collect::<Vec<_>>()
            .join("<br/>");

        Self::new(subject, body_text, body_html)
    }

    /// The subject line
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// The plain text body
    pub fn body_text(&self) -> &str {
        &self.body_text
    }

    /// The HTML body
    pub fn body_html(&self) -> &str {
        &self.body_html
    }
}

/// The canned demo message
impl Default for Message {
    fn default() -> Self {
        Self::new(
            "Broadcast Studio Demo",
            "Hello,\n\n\
             Here is a beautifully formatted broadcast generated from our Rust \
             studio. It proves that one email can reach hundreds of people at once.\n\n\
             Warm regards,\nBroadcast Studio",
            r#"<html>
    <body style="font-family: 'Segoe UI', Arial, sans-serif; color:#1f2933;">
        <p>Hello,</p>
        <p>
            Here is a <strong>beautifully formatted broadcast</strong> generated from our
            Rust studio. It proves that one email can reach hundreds of people at once.
        </p>
        <p style="margin-top:24px;">
            Warm regards,<br/>
            <span style="color:#2563eb; font-weight:600;">Broadcast Studio</span>
        </p>
    </body>
</html>
"#,
        )
    }
}
