//! Email service for password reset messages.

use lettre::{
    AsyncFileTransport, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use std::path::Path;
use url::Url;

use crate::{
    config::{Config, EmailTransportConfig},
    errors::Error,
};

pub struct EmailService {
    transport: EmailTransport,
    from_email: String,
    from_name: String,
    reply_to: Option<String>,
    base_url: Url,
}

enum EmailTransport {
    Smtp(AsyncSmtpTransport<Tokio1Executor>),
    File(AsyncFileTransport<Tokio1Executor>),
}

impl EmailService {
    pub fn new(config: &Config) -> Result<Self, Error> {
        let email_config = &config.email;

        let transport = match &email_config.transport {
            EmailTransportConfig::Smtp {
                host,
                port,
                username,
                password,
                use_tls,
            } => {
                if !use_tls {
                    tracing::warn!("SMTP TLS is disabled - this is not recommended for production");
                }

                let smtp_builder = if *use_tls {
                    AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                } else {
                    Ok(AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host))
                }
                .map_err(|e| Error::Internal {
                    operation: format!("create SMTP transport: {e}"),
                })?
                .port(*port)
                .credentials(Credentials::new(username.clone(), password.clone()));

                EmailTransport::Smtp(smtp_builder.build())
            }
            EmailTransportConfig::File { path } => {
                // Use file transport for development/testing
                let emails_dir = Path::new(path);
                if !emails_dir.exists() {
                    std::fs::create_dir_all(emails_dir).map_err(|e| Error::Internal {
                        operation: format!("create emails directory: {e}"),
                    })?;
                }
                EmailTransport::File(AsyncFileTransport::<Tokio1Executor>::new(emails_dir))
            }
        };

        Ok(Self {
            transport,
            from_email: email_config.from_email.clone(),
            from_name: email_config.from_name.clone(),
            reply_to: email_config.reply_to.clone(),
            base_url: config.auth.password_reset.base_url.clone(),
        })
    }

    /// Send the generated password together with the token that activates it.
    pub async fn send_new_password_email(&self, to_email: &str, to_name: Option<&str>, new_password: &str, token: &str) -> Result<(), Error> {
        let confirm_link = self.confirm_link(token);
        let body = new_password_body(to_name, new_password, &confirm_link);

        self.send_email(to_email, to_name, "Your new password", &body).await
    }

    fn confirm_link(&self, token: &str) -> String {
        format!("{}/auth/confirm-new-password/{token}/", self.base_url.as_str().trim_end_matches('/'))
    }

    async fn send_email(&self, to_email: &str, to_name: Option<&str>, subject: &str, body: &str) -> Result<(), Error> {
        let from = format!("{} <{}>", self.from_name, self.from_email)
            .parse::<Mailbox>()
            .map_err(|e| Error::Internal {
                operation: format!("parse from email: {e}"),
            })?;

        let to = if let Some(name) = to_name {
            format!("{name} <{to_email}>")
        } else {
            to_email.to_string()
        }
        .parse::<Mailbox>()
        .map_err(|e| Error::Internal {
            operation: format!("parse to email: {e}"),
        })?;

        let mut builder = Message::builder().from(from).to(to).subject(subject).header(ContentType::TEXT_HTML);
        if let Some(reply_to) = &self.reply_to {
            let reply_to = reply_to.parse::<Mailbox>().map_err(|e| Error::Internal {
                operation: format!("parse reply-to email: {e}"),
            })?;
            builder = builder.reply_to(reply_to);
        }

        let message = builder.body(body.to_string()).map_err(|e| Error::Internal {
            operation: format!("build email message: {e}"),
        })?;

        match &self.transport {
            EmailTransport::Smtp(smtp) => {
                smtp.send(message).await.map_err(|e| Error::Internal {
                    operation: format!("send SMTP email: {e}"),
                })?;
            }
            EmailTransport::File(file) => {
                file.send(message).await.map_err(|e| Error::Internal {
                    operation: format!("send file email: {e}"),
                })?;
            }
        }

        Ok(())
    }
}

fn new_password_body(to_name: Option<&str>, new_password: &str, confirm_link: &str) -> String {
    let greeting = if let Some(name) = to_name {
        format!("Hello {name},")
    } else {
        "Hello,".to_string()
    };

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>Your new password</title>
    <style>
        body {{ font-family: Arial, sans-serif; line-height: 1.6; color: #333; }}
        .container {{ max-width: 600px; margin: 0 auto; padding: 20px; }}
        .footer {{ margin-top: 30px; font-size: 12px; color: #666; }}
    </style>
</head>
<body>
    <div class="container">
        <h2>Your new password</h2>

        <p>{greeting}</p>

        <p>We received a request to reset your password. If you didn't make this request, you can safely ignore this email and keep using your current password.</p>

        <p>Your new password is: <strong>{new_password}</strong></p>

        <p>It becomes active once you confirm it:</p>

        <p><a href="{confirm_link}">Confirm new password</a></p>

        <div class="footer">
            <p>This is an automated message, please do not reply to this email.</p>
        </div>
    </div>
</body>
</html>"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_config;

    #[tokio::test]
    async fn test_email_service_creation() {
        let mail_dir = tempfile::tempdir().unwrap();
        let config = create_test_config(mail_dir.path());
        assert!(EmailService::new(&config).is_ok());
    }

    #[test]
    fn test_new_password_body() {
        let body = new_password_body(Some("Nick"), "Xy7pQwErTy12Ab", "http://localhost/auth/confirm-new-password/abc/");

        assert!(body.contains("Hello Nick,"));
        assert!(body.contains("Xy7pQwErTy12Ab"));
        assert!(body.contains("http://localhost/auth/confirm-new-password/abc/"));

        assert!(new_password_body(None, "pw", "link").contains("Hello,"));
    }

    #[tokio::test]
    async fn test_confirm_link_uses_base_url() {
        let mail_dir = tempfile::tempdir().unwrap();
        let mut config = create_test_config(mail_dir.path());
        config.auth.password_reset.base_url = Url::parse("https://accounts.example.com/").unwrap();

        let service = EmailService::new(&config).unwrap();
        assert_eq!(service.confirm_link("tok"), "https://accounts.example.com/auth/confirm-new-password/tok/");
    }

    #[tokio::test]
    async fn test_file_transport_writes_message() {
        let mail_dir = tempfile::tempdir().unwrap();
        let config = create_test_config(mail_dir.path());
        let service = EmailService::new(&config).unwrap();

        service
            .send_new_password_email("user@example.com", Some("Nick"), "Xy7pQwErTy12Ab", "sometoken")
            .await
            .unwrap();

        let files: Vec<_> = std::fs::read_dir(mail_dir.path().join("emails")).unwrap().collect();
        assert_eq!(files.len(), 1);

        let contents = std::fs::read_to_string(files[0].as_ref().unwrap().path()).unwrap();
        assert!(contents.contains("user@example.com"));
        assert!(contents.contains("Subject: Your new password"));
    }
}
