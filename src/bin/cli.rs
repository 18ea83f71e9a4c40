//! Outreach CLI
//!
//! Command-line interface for Outreach operations:
//! - Record behavior events
//! - Classify candidate lists
//! - Render calendar invites and send booking confirmations
//! - Preview follow-up emails

use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand};
use outreach::behavior::{BehaviorSegment, RejectionReason};
use outreach::followup::{build_message, load_candidates, Candidate, FollowupVariant};
use outreach::{BookingConfirmation, CalendarInvite, Config, EmailClient, SendOutcome};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "outreach-cli")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Patient outreach tooling: segments, invites and follow-up previews")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// API server URL
    #[arg(long, default_value = "http://localhost:8082", global = true)]
    pub api_url: String,

    /// Output format (table, json)
    #[arg(short, long, default_value = "table", global = true)]
    pub format: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Classify patients from a candidates CSV
    Classify {
        /// CSV with `secure_uuid,patient_id,email` columns
        candidates: PathBuf,
        /// Look-back window (e.g., 7d, 4w, 3m)
        #[arg(short, long, default_value = "30d")]
        last: String,
    },

    /// Record a behavior event
    Record {
        /// Event type (match_page_view, match_rejected, contact_modal_opened, contact_message_sent)
        event_type: String,
        /// Patient secure token
        #[arg(short = 'u', long)]
        secure_uuid: String,
        /// Therapist id
        #[arg(short, long)]
        therapist: Option<String>,
        /// Rejection reason
        #[arg(short, long)]
        reason: Option<String>,
        /// Extra properties in key=value format
        #[arg(short = 'P', long)]
        property: Vec<String>,
        /// Timestamp (default: now). Supports: "now", ISO 8601, Unix milliseconds
        #[arg(long)]
        time: Option<String>,
    },

    /// Render a booking confirmation invite (.ics)
    Invite {
        /// Booking id, used as the event UID
        uid: String,
        /// Session start (ISO 8601)
        start: String,
        /// Session length in minutes
        #[arg(short, long, default_value = "50")]
        minutes: i64,
        /// Event title
        #[arg(short, long, default_value = "Therapy session")]
        summary: String,
        #[arg(short, long)]
        location: Option<String>,
        /// Organizer email (therapist)
        #[arg(long)]
        organizer: Option<String>,
        /// Attendee email (patient)
        #[arg(long)]
        attendee: Option<String>,
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Email the invite as a booking confirmation to this address
        #[arg(long)]
        send: Option<String>,
        /// Match id for the confirmation (required with --send)
        #[arg(long, requires = "send")]
        match_id: Option<String>,
        /// Therapist id for the confirmation (required with --send)
        #[arg(long, requires = "send")]
        therapist: Option<String>,
        /// Config file path (used with --send)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Preview the follow-up email for a segment
    Preview {
        /// Segment: never_visited, visited_no_action, rejected:<reason>,
        /// almost_booked:<therapist_id>, contacted, or none
        segment: String,
        /// Recipient email
        #[arg(short, long, default_value = "patient@example.org")]
        email: String,
        /// Patient secure token
        #[arg(short = 'u', long, default_value = "00000000-0000-0000-0000-000000000000")]
        secure_uuid: String,
        /// Patient first name
        #[arg(short, long)]
        name: Option<String>,
        /// Print the HTML body instead of the text body
        #[arg(long)]
        html: bool,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Classify { candidates, last } => {
            let since = Utc::now() - parse_duration(&last)?;
            let candidates = load_candidates(&candidates)?;

            let tokens: HashMap<&str, &str> = candidates
                .iter()
                .map(|c| (c.secure_uuid.as_str(), c.patient_id.as_str()))
                .collect();

            let response = client
                .post(format!("{}/api/v1/segments", cli.api_url))
                .json(&json!({"candidates": tokens, "since": since.timestamp_millis()}))
                .send()
                .await?;

            if !response.status().is_success() {
                let status = response.status();
                let text = response.text().await.unwrap_or_default();
                eprintln!("Classification failed ({}): {}", status, text);
                std::process::exit(1);
            }

            let data: Value = response.json().await?;
            if cli.format == "json" {
                println!("{}", serde_json::to_string_pretty(&data)?);
            } else {
                print_segments(&candidates, &data["segments"]);
            }
        }

        Commands::Record {
            event_type,
            secure_uuid,
            therapist,
            reason,
            property,
            time,
        } => {
            let created_at = parse_timestamp(time.as_deref())?;

            let mut properties = Map::new();
            properties.insert("secure_uuid".to_string(), json!(secure_uuid));
            if let Some(therapist) = therapist {
                properties.insert("therapist_id".to_string(), json!(therapist));
            }
            if let Some(reason) = reason {
                properties.insert("reason".to_string(), json!(reason));
            }
            for prop in property {
                if let Some((k, v)) = prop.split_once('=') {
                    properties.insert(k.to_string(), json!(v));
                }
            }

            let body = json!({
                "type": event_type,
                "properties": properties,
                "created_at": created_at.timestamp_millis(),
            });

            let response = client
                .post(format!("{}/api/v1/events", cli.api_url))
                .json(&body)
                .send()
                .await?;

            if response.status().is_success() {
                let data: Value = response.json().await?;
                println!("Recorded {} (id {}) at {}", event_type, data["id"], created_at);
            } else {
                let status = response.status();
                let text = response.text().await.unwrap_or_default();
                eprintln!("Failed ({}): {}", status, text);
                std::process::exit(1);
            }
        }

        Commands::Invite {
            uid,
            start,
            minutes,
            summary,
            location,
            organizer,
            attendee,
            output,
            send,
            match_id,
            therapist,
            config,
        } => {
            let start = DateTime::parse_from_rfc3339(&start)?.with_timezone(&Utc);
            if minutes <= 0 {
                return Err("minutes must be positive".into());
            }

            let mut invite = CalendarInvite::new(uid, summary, start, start + Duration::minutes(minutes));
            if let Some(location) = location {
                invite = invite.location(location);
            }
            if let Some(organizer) = organizer {
                invite = invite.organizer(None, organizer);
            }
            if let Some(attendee) = attendee {
                invite = invite.attendee(None, attendee);
            }

            if let Some(to) = send {
                let match_id = match_id.ok_or("--send needs --match-id")?;
                let therapist = therapist.ok_or("--send needs --therapist")?;
                let config = match config {
                    Some(path) => Config::load(&path)?,
                    None => Config::load_default(),
                };
                config.logging.init();

                let client = EmailClient::new(&config)?;
                let booking = BookingConfirmation::new(match_id, therapist, to, invite);
                match booking.send(&client, &config.site).await {
                    SendOutcome::Sent { id, attempts } => println!(
                        "Confirmation sent (id {}, {} attempt(s))",
                        id.as_deref().unwrap_or("-"),
                        attempts
                    ),
                    SendOutcome::Skipped(reason) => println!("Confirmation skipped: {}", reason),
                    SendOutcome::Failed(e) => {
                        eprintln!("Confirmation failed: {}", e);
                        std::process::exit(1);
                    }
                }
                return Ok(());
            }

            let ics = invite.to_ics();
            match output {
                Some(path) => {
                    std::fs::write(&path, &ics)?;
                    println!("Invite written to {:?}", path);
                }
                None => print!("{}", ics),
            }
        }

        Commands::Preview {
            segment,
            email,
            secure_uuid,
            name,
            html,
        } => {
            let segment = parse_segment(&segment)?;
            let Some(variant) = FollowupVariant::select(segment.as_ref()) else {
                println!("No follow-up for this segment");
                return Ok(());
            };

            let config = Config::load_default();
            let candidate = Candidate {
                secure_uuid,
                patient_id: "preview".to_string(),
                email,
                name,
            };
            let digest_key = Utc::now().format("%Y-%m-%d").to_string();
            let message = build_message(&candidate, &variant, &config.site, &digest_key);

            println!("Template: {}", variant.template());
            println!("To:       {}", message.to.join(", "));
            println!("Subject:  {}", message.subject);
            println!();
            let body = if html { message.html } else { message.text };
            println!("{}", body.unwrap_or_default());
        }

        Commands::Config { output } => {
            let config = outreach::config::generate_default_config();

            match output {
                Some(path) => {
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(&path, &config)?;
                    println!("Config written to {:?}", path);
                }
                None => {
                    print!("{}", config);
                }
            }
        }
    }

    Ok(())
}

fn parse_duration(s: &str) -> Result<Duration, Box<dyn std::error::Error>> {
    let s = s.trim().to_lowercase();

    if let Some(days) = s.strip_suffix('d') {
        Ok(Duration::days(days.parse()?))
    } else if let Some(weeks) = s.strip_suffix('w') {
        Ok(Duration::weeks(weeks.parse()?))
    } else if let Some(months) = s.strip_suffix('m') {
        Ok(Duration::days(months.parse::<i64>()? * 30))
    } else {
        Err(format!("Invalid duration format: {}. Use: 7d, 4w, 3m", s).into())
    }
}

fn parse_timestamp(s: Option<&str>) -> Result<DateTime<Utc>, Box<dyn std::error::Error>> {
    match s {
        None | Some("now") => Ok(Utc::now()),
        Some(s) => {
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                Ok(dt.with_timezone(&Utc))
            } else if let Ok(ms) = s.parse::<i64>() {
                DateTime::from_timestamp_millis(ms)
                    .ok_or_else(|| format!("Timestamp out of range: {}", s).into())
            } else {
                Err(format!("Invalid timestamp format: {}", s).into())
            }
        }
    }
}

/// `none` means "no signal" and maps to the generic follow-up
fn parse_segment(s: &str) -> Result<Option<BehaviorSegment>, Box<dyn std::error::Error>> {
    let (name, arg) = match s.split_once(':') {
        Some((name, arg)) => (name, Some(arg)),
        None => (s, None),
    };

    let segment = match name {
        "none" => return Ok(None),
        "never_visited" => BehaviorSegment::NeverVisited,
        "visited_no_action" => BehaviorSegment::VisitedNoAction {
            visit_count: arg.and_then(|a| a.parse().ok()).unwrap_or(1),
        },
        "rejected" => BehaviorSegment::Rejected {
            reasons: vec![RejectionReason {
                reason: arg.unwrap_or("unspecified").to_string(),
                therapist_id: "preview".to_string(),
                details: None,
            }],
        },
        "almost_booked" => BehaviorSegment::AlmostBooked {
            therapist_id: arg
                .ok_or("almost_booked needs a therapist id, e.g. almost_booked:t1")?
                .to_string(),
        },
        "contacted" => BehaviorSegment::Contacted,
        other => return Err(format!("Unknown segment: {}", other).into()),
    };

    Ok(Some(segment))
}

fn print_segments(candidates: &[Candidate], segments: &Value) {
    println!("{:<24} {:<32} {:<20} {}", "Patient", "Email", "Segment", "Detail");
    println!("{}", "-".repeat(90));

    for candidate in candidates {
        let segment = &segments[&candidate.patient_id];
        let name = segment["segment"].as_str().unwrap_or("-");
        let detail = match name {
            "visited_no_action" => format!("{} visit(s)", segment["visitCount"]),
            "almost_booked" => segment["therapist_id"].as_str().unwrap_or_default().to_string(),
            "rejected" => segment["reasons"][0]["reason"]
                .as_str()
                .unwrap_or_default()
                .to_string(),
            _ => String::new(),
        };
        println!(
            "{:<24} {:<32} {:<20} {}",
            candidate.patient_id, candidate.email, name, detail
        );
    }
}
