//! Follow-up emails
//!
//! Picks an email variant per patient from their behavior segment and sends
//! it. Patients who already contacted a therapist get nothing; patients the
//! classifier could not place get the generic variant.

use crate::behavior::{is_primary_interview_rejection, BehaviorClassifier, BehaviorSegment};
use crate::config::SiteConfig;
use crate::email::{EmailClient, EmailContext, EmailMessage, SendOutcome};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use url::Url;

/// A patient eligible for a follow-up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub secure_uuid: String,
    pub patient_id: String,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Errors while preparing a follow-up run
#[derive(Debug, Error)]
pub enum FollowupError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Load candidates from a CSV with a `secure_uuid,patient_id,email[,name]` header
pub fn load_candidates(path: &Path) -> Result<Vec<Candidate>, FollowupError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)?;

    let mut candidates = Vec::new();
    for record in reader.deserialize() {
        let candidate: Candidate = record?;
        if candidate.secure_uuid.is_empty() || candidate.patient_id.is_empty() {
            tracing::warn!(email = %candidate.email, "Skipping candidate without token or id");
            continue;
        }
        candidates.push(candidate);
    }
    Ok(candidates)
}

/// Follow-up email variants
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "variant", rename_all = "snake_case")]
pub enum FollowupVariant {
    /// No behavior signal available
    Generic,
    /// Never opened the match page
    Reminder,
    /// Looked at matches but did nothing
    NudgeAfterVisit { visit_count: u32 },
    /// Rejected for price, method or insurance; personal outreach
    PrimaryRejectionOutreach { reason: String },
    /// Rejected for other reasons; offer more therapists
    AlternativeMatches,
    /// Opened the contact form but did not send
    FinishBooking { therapist_id: String },
}

impl FollowupVariant {
    /// Variant for a patient, or `None` when no follow-up should go out
    pub fn select(segment: Option<&BehaviorSegment>) -> Option<Self> {
        let segment = match segment {
            Some(segment) => segment,
            None => return Some(FollowupVariant::Generic),
        };

        let variant = match segment {
            BehaviorSegment::Contacted => return None,
            BehaviorSegment::NeverVisited => FollowupVariant::Reminder,
            BehaviorSegment::VisitedNoAction { visit_count } => FollowupVariant::NudgeAfterVisit {
                visit_count: *visit_count,
            },
            BehaviorSegment::Rejected { reasons } if is_primary_interview_rejection(segment) => {
                FollowupVariant::PrimaryRejectionOutreach {
                    reason: reasons
                        .first()
                        .map(|r| r.reason.clone())
                        .unwrap_or_default(),
                }
            }
            BehaviorSegment::Rejected { .. } => FollowupVariant::AlternativeMatches,
            BehaviorSegment::AlmostBooked { therapist_id } => FollowupVariant::FinishBooking {
                therapist_id: therapist_id.clone(),
            },
        };
        Some(variant)
    }

    /// Template name, recorded in the email context
    pub fn template(&self) -> &'static str {
        match self {
            FollowupVariant::Generic => "followup_generic",
            FollowupVariant::Reminder => "followup_reminder",
            FollowupVariant::NudgeAfterVisit { .. } => "followup_nudge",
            FollowupVariant::PrimaryRejectionOutreach { .. } => "followup_primary_rejection",
            FollowupVariant::AlternativeMatches => "followup_alternatives",
            FollowupVariant::FinishBooking { .. } => "followup_finish_booking",
        }
    }

    fn subject(&self) -> &'static str {
        match self {
            FollowupVariant::Generic => "Your therapist matches are waiting",
            FollowupVariant::Reminder => "Your personal therapist matches are ready",
            FollowupVariant::NudgeAfterVisit { .. } => "Still looking for the right therapist?",
            FollowupVariant::PrimaryRejectionOutreach { .. } => "Can we help you find a better fit?",
            FollowupVariant::AlternativeMatches => "We have more therapists for you",
            FollowupVariant::FinishBooking { .. } => "Ready to reach out?",
        }
    }

    fn lead(&self) -> String {
        match self {
            FollowupVariant::Generic | FollowupVariant::Reminder => {
                "We have selected therapists who fit what you told us. Take a look when you have a moment.".to_string()
            }
            FollowupVariant::NudgeAfterVisit { .. } => {
                "You had a look at your matches. If none of them felt right yet, reply to this email and we will help.".to_string()
            }
            FollowupVariant::PrimaryRejectionOutreach { reason } => match reason.as_str() {
                "too_expensive" => "Cost should not stand in the way. Reply and we will walk you through lower-cost options.".to_string(),
                "wants_insurance" => "You mentioned insurance coverage. Reply and we will explain which options your insurance supports.".to_string(),
                _ => "You told us the therapy method did not fit. Reply and we will suggest therapists with a different approach.".to_string(),
            },
            FollowupVariant::AlternativeMatches => {
                "Thanks for your feedback. We have found more therapists who may suit you better.".to_string()
            }
            FollowupVariant::FinishBooking { .. } => {
                "You were about to contact a therapist. Your message is only a click away.".to_string()
            }
        }
    }
}

/// Link to a patient's match page, optionally focused on one therapist
pub fn match_link(site: &SiteConfig, secure_uuid: &str, therapist_id: Option<&str>) -> String {
    match Url::parse(site.base()) {
        Ok(mut url) => {
            if let Ok(mut segments) = url.path_segments_mut() {
                segments.pop_if_empty().push("matches").push(secure_uuid);
            }
            if let Some(therapist_id) = therapist_id {
                url.query_pairs_mut().append_pair("therapist", therapist_id);
            }
            url.to_string()
        }
        Err(_) => {
            let mut link = format!("{}/matches/{}", site.base(), urlencoding::encode(secure_uuid));
            if let Some(therapist_id) = therapist_id {
                link.push_str("?therapist=");
                link.push_str(&urlencoding::encode(therapist_id));
            }
            link
        }
    }
}

/// Build the follow-up email for one candidate
pub fn build_message(
    candidate: &Candidate,
    variant: &FollowupVariant,
    site: &SiteConfig,
    digest_key: &str,
) -> EmailMessage {
    let therapist_id = match variant {
        FollowupVariant::FinishBooking { therapist_id } => Some(therapist_id.as_str()),
        _ => None,
    };
    let link = match_link(site, &candidate.secure_uuid, therapist_id);

    let greeting = match candidate.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => format!("Hi {},", name),
        None => "Hello,".to_string(),
    };
    let lead = variant.lead();

    let html = format!(
        "<p>{}</p><p>{}</p><p><a href=\"{}\">View your matches</a></p>",
        escape_html(&greeting),
        escape_html(&lead),
        escape_html(&link)
    );
    let text = format!("{}\n\n{}\n\nView your matches: {}", greeting, lead, link);

    let mut context = EmailContext::new("patient_followup")
        .with("template", variant.template())
        .with("patient_id", candidate.patient_id.as_str())
        .with("email_token", candidate.secure_uuid.as_str())
        .with("digest_key", digest_key);
    if let Some(therapist_id) = therapist_id {
        context = context.with("therapist_id", therapist_id);
    }

    EmailMessage::new([candidate.email.as_str()], variant.subject())
        .html(html)
        .text(text)
        .context(context)
}

fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Summary of one follow-up run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FollowupReport {
    pub total: usize,
    pub sent: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Candidates who need no follow-up (already contacted)
    pub no_followup: usize,
    /// Emails per template
    pub by_template: HashMap<String, usize>,
}

/// Classify candidates and send their follow-ups, one at a time
pub struct FollowupJob {
    classifier: BehaviorClassifier,
    email: EmailClient,
    site: SiteConfig,
}

impl FollowupJob {
    pub fn new(classifier: BehaviorClassifier, email: EmailClient, site: SiteConfig) -> Self {
        Self {
            classifier,
            email,
            site,
        }
    }

    /// Plan variants without sending
    pub async fn plan(
        &self,
        candidates: &[Candidate],
        since: DateTime<Utc>,
    ) -> Vec<(Candidate, Option<FollowupVariant>)> {
        let tokens: HashMap<String, String> = candidates
            .iter()
            .map(|c| (c.secure_uuid.clone(), c.patient_id.clone()))
            .collect();

        let segments = self.classifier.classify(&tokens, since).await;

        candidates
            .iter()
            .map(|c| {
                let variant = FollowupVariant::select(segments.get(&c.patient_id));
                (c.clone(), variant)
            })
            .collect()
    }

    pub async fn run(&self, candidates: &[Candidate], since: DateTime<Utc>) -> FollowupReport {
        let digest_key = Utc::now().format("%Y-%m-%d").to_string();
        let plan = self.plan(candidates, since).await;

        let mut report = FollowupReport {
            total: plan.len(),
            ..Default::default()
        };

        for (candidate, variant) in plan {
            let Some(variant) = variant else {
                report.no_followup += 1;
                continue;
            };

            let message = build_message(&candidate, &variant, &self.site, &digest_key);
            match self.email.send(&message).await {
                SendOutcome::Sent { .. } => {
                    report.sent += 1;
                    *report
                        .by_template
                        .entry(variant.template().to_string())
                        .or_default() += 1;
                }
                SendOutcome::Skipped(reason) => {
                    tracing::debug!(patient_id = %candidate.patient_id, %reason, "Follow-up skipped");
                    report.skipped += 1;
                }
                SendOutcome::Failed(_) => report.failed += 1,
            }
        }

        tracing::info!(
            total = report.total,
            sent = report.sent,
            skipped = report.skipped,
            failed = report.failed,
            no_followup = report.no_followup,
            "Follow-up run complete"
        );

        report
    }
}
