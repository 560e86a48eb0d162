use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::Parser;

use crate::config::ParticipantConfig;
use crate::controller::ConsentDecision;
use crate::error::ChainError;
use crate::store::SessionIds;

#[derive(Parser, Debug)]
#[command(name = "chain-participant")]
#[command(version)]
#[command(about = "Take part in a transmission-chain memory experiment from the terminal")]
#[command(after_help = "Answers are read from stdin, one word per line; `/leave` or end of \
input leaves the chat. When stdin is a pipe or file every line is kept and sent in order, \
so `printf 'cat\\ndog\\n' | chain-participant --dry-run` submits both words.")]
pub struct Args {
    /// Entry URL carrying hit_id, worker_id, assignment_id and mode
    pub entry_url: Option<String>,

    /// Experiment server base URL (overrides config and CHAIN_SERVER_URL)
    #[arg(long)]
    pub server: Option<String>,

    /// TOML configuration file
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// HIT id, when no entry URL is given
    #[arg(long)]
    pub hit_id: Option<String>,

    /// Worker id, when no entry URL is given
    #[arg(long)]
    pub worker_id: Option<String>,

    /// Assignment id, when no entry URL is given
    #[arg(long)]
    pub assignment_id: Option<String>,

    /// Recruitment mode, when no entry URL is given
    #[arg(long, default_value = "debug")]
    pub mode: String,

    /// Decline the consent form
    #[arg(long)]
    pub decline: bool,

    /// Local store file (overrides config)
    #[arg(long)]
    pub store: Option<PathBuf>,

    /// Leave the chat automatically after this many seconds
    #[arg(long)]
    pub chat_timeout: Option<u64>,

    /// Questionnaire answer as key=value (repeatable)
    #[arg(long = "answer", value_parser = parse_answer)]
    pub answers: Vec<(String, String)>,

    /// Run against an in-process experiment instead of a server
    #[arg(long)]
    pub dry_run: bool,
}

impl Args {
    /// Identifiers from the entry URL, else from the id flags, else freshly
    /// generated for debug and dry runs.
    pub fn session_ids(&self) -> Result<SessionIds, ChainError> {
        if let Some(url) = &self.entry_url {
            return SessionIds::from_entry_url(url);
        }
        match (&self.hit_id, &self.worker_id, &self.assignment_id) {
            (Some(hit), Some(worker), Some(assignment)) => Ok(SessionIds {
                hit_id: hit.clone(),
                worker_id: worker.clone(),
                assignment_id: assignment.clone(),
                mode: self.mode.clone(),
            }),
            (None, None, None) if self.dry_run || self.mode == "debug" => {
                let mut ids = SessionIds::generate_debug();
                ids.mode = self.mode.clone();
                Ok(ids)
            }
            _ => Err(ChainError::Config(
                "give an entry URL or all of --hit-id, --worker-id and --assignment-id".to_string(),
            )),
        }
    }

    pub fn consent(&self) -> ConsentDecision {
        if self.decline {
            ConsentDecision::Decline
        } else {
            ConsentDecision::Accept
        }
    }

    /// Fold the flags into `config`.
    pub fn apply(&self, config: &mut ParticipantConfig) {
        if let Some(server) = &self.server {
            config.server.base_url = server.clone();
        }
        if let Some(store) = &self.store {
            config.store_path = store.clone();
        }
        if let Some(secs) = self.chat_timeout {
            config.timing.chat_timeout_ms = Some(secs * 1_000);
        }
        let answers: BTreeMap<_, _> = self.answers.iter().cloned().collect();
        config.questionnaire.extend(answers);
    }
}

fn parse_answer(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{s}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty answer key in '{s}'"));
    }
    Ok((key.to_string(), value.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parse_minimal() {
        let args = Args::parse_from(["cp"]);
        assert!(args.entry_url.is_none());
        assert!(args.server.is_none());
        assert_eq!(args.mode, "debug");
        assert!(!args.decline);
        assert!(!args.dry_run);
        assert!(args.answers.is_empty());
    }

    #[test]
    fn test_args_parse_entry_url() {
        let args = Args::parse_from([
            "cp",
            "http://localhost:5000/consent?hit_id=H&worker_id=W&assignment_id=A&mode=live",
        ]);
        let ids = args.session_ids().unwrap();
        assert_eq!(ids.worker_id, "W");
        assert_eq!(ids.mode, "live");
    }

    #[test]
    fn test_args_id_flags() {
        let args = Args::parse_from([
            "cp",
            "--hit-id",
            "H",
            "--worker-id",
            "W",
            "--assignment-id",
            "A",
            "--mode",
            "sandbox",
        ]);
        let ids = args.session_ids().unwrap();
        assert_eq!(ids.unique_id(), "W:A");
        assert_eq!(ids.mode, "sandbox");
    }

    #[test]
    fn test_args_partial_id_flags_rejected() {
        let args = Args::parse_from(["cp", "--worker-id", "W", "--mode", "live"]);
        assert!(matches!(args.session_ids(), Err(ChainError::Config(_))));
    }

    #[test]
    fn test_args_debug_mode_generates_ids() {
        let args = Args::parse_from(["cp"]);
        assert_eq!(args.session_ids().unwrap().mode, "debug");
    }

    #[test]
    fn test_args_live_mode_needs_ids() {
        let args = Args::parse_from(["cp", "--mode", "live"]);
        assert!(args.session_ids().is_err());
    }

    #[test]
    fn test_args_help_explains_piped_input() {
        use clap::CommandFactory;
        let help = Args::command().render_help().to_string();
        assert!(help.contains("/leave"), "{help}");
        assert!(help.contains("pipe"), "{help}");
    }

    #[test]
    fn test_args_decline() {
        assert_eq!(Args::parse_from(["cp"]).consent(), ConsentDecision::Accept);
        assert_eq!(
            Args::parse_from(["cp", "--decline"]).consent(),
            ConsentDecision::Decline
        );
    }

    #[test]
    fn test_args_answers_parse() {
        let args = Args::parse_from(["cp", "--answer", "engagement=5", "--answer", "fun = yes"]);
        assert_eq!(
            args.answers,
            vec![
                ("engagement".to_string(), "5".to_string()),
                ("fun".to_string(), "yes".to_string())
            ]
        );
    }

    #[test]
    fn test_args_bad_answer_rejected() {
        assert!(Args::try_parse_from(["cp", "--answer", "novalue"]).is_err());
        assert!(Args::try_parse_from(["cp", "--answer", "=5"]).is_err());
    }

    #[test]
    fn test_args_apply_overrides_config() {
        let args = Args::parse_from([
            "cp",
            "--server",
            "http://chain.example.org",
            "--store",
            "/tmp/s.json",
            "--chat-timeout",
            "90",
            "--answer",
            "engagement=4",
        ]);
        let mut config = ParticipantConfig::default();
        config
            .questionnaire
            .insert("difficulty".to_string(), "2".to_string());
        args.apply(&mut config);
        assert_eq!(config.server.base_url, "http://chain.example.org");
        assert_eq!(config.store_path, PathBuf::from("/tmp/s.json"));
        assert_eq!(config.timing.chat_timeout_ms, Some(90_000));
        assert_eq!(config.questionnaire.len(), 2);
        assert_eq!(config.questionnaire["engagement"], "4");
    }
}
