//! Booking confirmations
//!
//! Confirmation email for a booked session, carrying the `invite.ics`
//! calendar attachment.

use crate::calendar::CalendarInvite;
use crate::config::SiteConfig;
use crate::email::{EmailClient, EmailContext, EmailMessage, SendOutcome};

/// A confirmed session between a patient and a therapist
#[derive(Debug, Clone)]
pub struct BookingConfirmation {
    /// Match the booking was made from
    pub match_id: String,
    pub therapist_id: String,
    pub patient_id: Option<String>,
    /// Recipient
    pub email: String,
    pub therapist_name: Option<String>,
    pub invite: CalendarInvite,
}

impl BookingConfirmation {
    pub fn new(
        match_id: impl Into<String>,
        therapist_id: impl Into<String>,
        email: impl Into<String>,
        invite: CalendarInvite,
    ) -> Self {
        Self {
            match_id: match_id.into(),
            therapist_id: therapist_id.into(),
            patient_id: None,
            email: email.into(),
            therapist_name: None,
            invite,
        }
    }

    pub fn patient_id(mut self, patient_id: impl Into<String>) -> Self {
        self.patient_id = Some(patient_id.into());
        self
    }

    pub fn therapist_name(mut self, name: impl Into<String>) -> Self {
        self.therapist_name = Some(name.into());
        self
    }

    /// Render the confirmation email with the invite attached
    pub fn build_message(&self, site: &SiteConfig) -> EmailMessage {
        let when = self.invite.start.format("%d.%m.%Y, %H:%M UTC").to_string();
        let with = self
            .therapist_name
            .as_deref()
            .map(|n| format!(" with {}", n))
            .unwrap_or_default();
        let link = format!("{}/matches", site.base_url.trim_end_matches('/'));

        let mut lines = vec![format!("Your session{} is booked for {}.", with, when)];
        if let Some(location) = &self.invite.location {
            lines.push(format!("Location: {}", location));
        }
        lines.push("The attached invite adds it to your calendar.".to_string());

        let html = lines
            .iter()
            .map(|l| format!("<p>{}</p>", escape_html(l)))
            .chain(std::iter::once(format!(
                "<p><a href=\"{}\">Manage your booking</a></p>",
                escape_html(&link)
            )))
            .collect::<String>();
        let text = format!("{}\n\nManage your booking: {}", lines.join("\n\n"), link);

        let mut context = EmailContext::new("booking_confirmation")
            .with("match_id", self.match_id.as_str())
            .with("therapist_id", self.therapist_id.as_str())
            .with("stage", "confirmed");
        if let Some(patient_id) = &self.patient_id {
            context = context.with("patient_id", patient_id.as_str());
        }

        EmailMessage::new([self.email.as_str()], "Your session is booked")
            .html(html)
            .text(text)
            .attachment(self.invite.as_attachment())
            .context(context)
    }

    /// Build and send the confirmation
    pub async fn send(&self, client: &EmailClient, site: &SiteConfig) -> SendOutcome {
        let outcome = client.send(&self.build_message(site)).await;
        match &outcome {
            SendOutcome::Sent { .. } => {
                tracing::info!(match_id = %self.match_id, uid = %self.invite.uid, "Booking confirmation sent")
            }
            SendOutcome::Skipped(reason) => {
                tracing::info!(match_id = %self.match_id, reason = %reason, "Booking confirmation skipped")
            }
            SendOutcome::Failed(e) => {
                tracing::warn!(match_id = %self.match_id, error = %e, "Booking confirmation failed")
            }
        }
        outcome
    }
}

fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
