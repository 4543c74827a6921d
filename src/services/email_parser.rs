use mailparse::{DispositionType, MailHeaderMap, ParsedMail};

use crate::models::email::{Attachment, FullContent, NO_DATE, NO_RECIPIENT, NO_SENDER, NO_SUBJECT};

#[derive(Debug, thiserror::Error)]
#[error("Unable to parse message: {0}")]
pub struct ParseError(String);

impl From<mailparse::MailParseError> for ParseError {
    fn from(error: mailparse::MailParseError) -> Self {
        ParseError(error.to_string())
    }
}

/// Decodes an RFC 822 message into headers, text/html bodies and attachments.
///
/// Every non-attachment `text/plain` part is appended to `body_text` and every
/// `text/html` part to `body_html`, in MIME tree order.
pub fn parse_raw_message(raw: &[u8]) -> Result<FullContent, ParseError> {
    let parsed = mailparse::parse_mail(raw)?;
    let headers = &parsed.headers;

    let mut content = FullContent {
        subject: headers.get_first_value("Subject").unwrap_or_else(|| NO_SUBJECT.to_string()),
        from: headers.get_first_value("From").unwrap_or_else(|| NO_SENDER.to_string()),
        to: headers.get_first_value("To").unwrap_or_else(|| NO_RECIPIENT.to_string()),
        date: headers.get_first_value("Date").unwrap_or_else(|| NO_DATE.to_string()),
        body_text: String::new(),
        body_html: String::new(),
        attachments: Vec::new(),
        error: false,
    };
    walk(&parsed, &mut content)?;
    Ok(content)
}

fn walk(part: &ParsedMail<'_>, content: &mut FullContent) -> Result<(), ParseError> {
    if !part.subparts.is_empty() {
        for sub in &part.subparts {
            walk(sub, content)?;
        }
        return Ok(());
    }

    let disposition = part.get_content_disposition();
    if disposition.disposition == DispositionType::Attachment {
        let filename = disposition
            .params
            .get("filename")
            .or_else(|| part.ctype.params.get("name"))
            .cloned();
        if let Some(filename) = filename {
            let data = part.get_body_raw()?;
            content.attachments.push(Attachment {
                filename,
                size: data.len(),
                content_type: part.ctype.mimetype.clone(),
                data,
            });
        }
        return Ok(());
    }

    match part.ctype.mimetype.as_str() {
        "text/plain" => content.body_text.push_str(&decode_body(part)?),
        "text/html" => content.body_html.push_str(&decode_body(part)?),
        _ => {}
    }
    Ok(())
}

/// Body text in the declared charset, falling back to lossy UTF-8.
fn decode_body(part: &ParsedMail<'_>) -> Result<String, ParseError> {
    match part.get_body() {
        Ok(body) => Ok(body),
        Err(_) => Ok(String::from_utf8_lossy(&part.get_body_raw()?).into_owned()),
    }
}
