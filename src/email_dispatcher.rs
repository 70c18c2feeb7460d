//! Fire-and-forget delivery of contact form emails.
//!
//! [`EmailDispatcher::dispatch`] turns a [`ContactMessage`] into two
//! [`EmailJob`]s and queues them on a bounded channel drained by a fixed
//! number of worker tasks. Callers never wait for delivery; transport
//! failures are logged by the worker and the job is dropped.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::Instrument;

use crate::configuration::DispatcherSettings;
use crate::domain::{ContactEmail, ContactMessage};
use crate::email_client::{EmailBody, EmailJob, MailTransport};

pub const ADMIN_NOTICE_SUBJECT: &str = "Nuevo mensaje de contacto";
pub const CONFIRMATION_SUBJECT: &str = "Confirmación de recepción de mensaje";

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchError {
    #[error("The email queue is full")]
    QueueFull,
    #[error("The email workers have shut down")]
    QueueClosed,
}

impl<T> From<mpsc::error::TrySendError<T>> for DispatchError {
    fn from(e: mpsc::error::TrySendError<T>) -> Self {
        match e {
            mpsc::error::TrySendError::Full(_) => DispatchError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => DispatchError::QueueClosed,
        }
    }
}

#[derive(Clone, Debug)]
pub struct EmailDispatcher {
    queue: mpsc::Sender<EmailJob>,
    admin_email: ContactEmail,
}

impl EmailDispatcher {
    /// Spawn `settings.workers` delivery tasks on the current tokio runtime.
    pub fn start<T>(transport: T, admin_email: ContactEmail, settings: &DispatcherSettings) -> Self
    where
        T: MailTransport + 'static,
    {
        // Both jobs of a message must fit at once.
        let (queue, receiver) = mpsc::channel(settings.queue_capacity.max(2));
        let receiver = Arc::new(Mutex::new(receiver));
        let transport = Arc::new(transport);

        for worker_id in 0..settings.workers.max(1) {
            tokio::spawn(run_worker(
                worker_id,
                Arc::clone(&receiver),
                Arc::clone(&transport),
            ));
        }

        Self { queue, admin_email }
    }

    /// Queue the admin notice and the sender confirmation for `message`.
    ///
    /// Either both jobs are queued or neither is. Never waits on delivery.
    #[tracing::instrument(name = "Dispatch contact emails", skip(self, message))]
    pub fn dispatch(&self, message: &ContactMessage) -> Result<(), DispatchError> {
        let notice_permit = self.queue.try_reserve()?;
        let confirmation_permit = self.queue.try_reserve()?;

        let [notice, confirmation] = compose_jobs(message, &self.admin_email);
        tracing::info!(
            notice_id = %notice.id,
            confirmation_id = %confirmation.id,
            "Queued contact emails"
        );
        notice_permit.send(notice);
        confirmation_permit.send(confirmation);
        Ok(())
    }
}

/// The two emails produced for every contact message: admin notice first, then
/// the confirmation sent back to the author.
pub fn compose_jobs(message: &ContactMessage, admin_email: &ContactEmail) -> [EmailJob; 2] {
    [
        admin_notice(message, admin_email),
        sender_confirmation(message),
    ]
}

fn admin_notice(message: &ContactMessage, admin_email: &ContactEmail) -> EmailJob {
    let body = format!(
        "Nombre: {name}\n\
         Email: {email}\n\
         Asunto: {subject}\n\n\
         Mensaje:\n{message}",
        name = message.sender_name(),
        email = message.sender_email(),
        subject = message.subject().as_ref(),
        message = message.body().as_ref(),
    );
    EmailJob::new(
        admin_email.clone(),
        format!("{}: {}", ADMIN_NOTICE_SUBJECT, message.subject().as_ref()),
        EmailBody::Plain(body),
    )
}

fn sender_confirmation(message: &ContactMessage) -> EmailJob {
    let body = format!(
        r#"<!DOCTYPE html>
<html lang="es">
<head>
    <meta http-equiv="content-type" content="text/html; charset=utf-8">
    <title>{title}</title>
</head>
<body>
    <p>Hola {name},</p>
    <p>Hemos recibido tu mensaje "{subject}" y te responderemos lo antes posible.</p>
    <p>Gracias por escribirnos.</p>
</body>
</html>
"#,
        title = CONFIRMATION_SUBJECT,
        name = htmlescape::encode_minimal(message.sender_name().as_ref()),
        subject = htmlescape::encode_minimal(message.subject().as_ref()),
    );
    EmailJob::new(
        message.sender_email().clone(),
        CONFIRMATION_SUBJECT,
        EmailBody::Html(body),
    )
}

async fn run_worker<T: MailTransport>(
    worker_id: usize,
    receiver: Arc<Mutex<mpsc::Receiver<EmailJob>>>,
    transport: Arc<T>,
) {
    loop {
        let job = {
            let mut receiver = receiver.lock().await;
            receiver.recv().await
        };
        let Some(job) = job else {
            break;
        };
        let span = tracing::info_span!("Deliver email", worker_id, job_id = %job.id);
        deliver(transport.as_ref(), job).instrument(span).await;
    }
    tracing::debug!(worker_id, "Email worker stopped");
}

async fn deliver<T: MailTransport>(transport: &T, job: EmailJob) {
    match transport.send(&job).await {
        Ok(()) => tracing::info!(recipient = %job.recipient, "Email delivered"),
        Err(e) => tracing::error!(
            error.cause_chain = ?e,
            error.message = %e,
            recipient = %job.recipient,
            "Failed to deliver email"
        ),
    }
}
