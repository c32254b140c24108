use std::path::Path;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport as _, Message, Tokio1Executor};

use crate::config::DeliveryConfig;
use crate::error::DeliveryError;

const EPUB_MEDIA_TYPE: &str = "application/epub+zip";
const BODY_TEXT: &str = "Please see your epub attached";

/// Hands a written artifact to the reader's device.
#[async_trait]
pub trait DeliverySink: Send + Sync {
    /// Returns the transport's acknowledgement.
    async fn deliver(&self, attachment: &Path) -> Result<String, DeliveryError>;
}

/// Sends the artifact as an email attachment through an SMTP relay.
#[derive(Debug, Clone)]
pub struct SmtpDelivery {
    config: DeliveryConfig,
}

impl SmtpDelivery {
    pub fn new(config: DeliveryConfig) -> Self {
        Self { config }
    }

    pub fn build_message(&self, attachment: &Path, bytes: Vec<u8>) -> Result<Message, DeliveryError> {
        let from = parse_mailbox(&self.config.from)?;
        let to = parse_mailbox(&self.config.recipient)?;
        let file_name = attachment
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "articles.epub".to_owned());
        let content_type = ContentType::parse(EPUB_MEDIA_TYPE)?;

        let message = Message::builder()
            .from(from)
            .to(to)
            .subject(self.config.subject.clone())
            .multipart(
                MultiPart::mixed()
                    .singlepart(SinglePart::plain(BODY_TEXT.to_owned()))
                    .singlepart(Attachment::new(file_name).body(bytes, content_type)),
            )?;
        Ok(message)
    }
}

#[async_trait]
impl DeliverySink for SmtpDelivery {
    async fn deliver(&self, attachment: &Path) -> Result<String, DeliveryError> {
        let bytes = tokio::fs::read(attachment)
            .await
            .map_err(|source| DeliveryError::Attachment {
                path: attachment.to_path_buf(),
                source,
            })?;
        let message = self.build_message(attachment, bytes)?;

        tracing::info!(
            to = %self.config.recipient,
            host = %self.config.smtp_host,
            "sending email"
        );
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&self.config.smtp_host)?
            .credentials(Credentials::new(
                self.config.smtp_user.clone(),
                self.config.smtp_password.expose().to_owned(),
            ))
            .timeout(Some(self.config.timeout))
            .build();

        let response = transport.send(message).await?;
        Ok(response.message().collect::<Vec<_>>().join(" "))
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, DeliveryError> {
    address
        .parse::<Mailbox>()
        .map_err(|source| DeliveryError::Address {
            address: address.to_owned(),
            source,
        })
}
