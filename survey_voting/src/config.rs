// ********* Macro parameters and configuration ***********

use std::collections::HashMap;
use std::error::Error;
use std::fmt::Display;

/// Parameter keys understood by the vote and survey macros.
pub const KEY_TITLE: &str = "title";
pub const KEY_POSITIONAL_TITLE: &str = "0";
pub const KEY_RENDER_TITLE_LEVEL: &str = "renderTitleLevel";
pub const KEY_CHANGEABLE_VOTES: &str = "changeableVotes";
pub const KEY_VOTERS: &str = "voters";
pub const KEY_VIEWERS: &str = "viewers";
pub const KEY_VISIBLE_VOTERS: &str = "visibleVoters";
pub const KEY_VISIBLE_VOTERS_WIKI: &str = "visibleVotersWiki";
pub const KEY_LOCKED: &str = "locked";

// Prefix vote to make a vote unique in the content properties.
pub const VOTE_PREFIX: &str = "vote.";
// Prefix for survey comment properties.
pub const SURVEY_PREFIX: &str = "survey.";

/// The content store silently truncates keys longer than this, so a render
/// must not proceed with keys that would exceed it.
pub const MAX_STORABLE_KEY_LENGTH: usize = 200;

const DEFAULT_TITLE_RENDER_LEVEL: u8 = 3;

/// The settings of one vote macro, or of a whole survey.
///
/// Parsed once per render from the macro parameters and immutable afterwards.
/// All the ballots of a survey carry a copy of the same configuration.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct VoteConfig {
    /// Users or groups allowed to cast a vote. Empty means anyone may vote.
    pub voters: Vec<String>,
    /// Users or groups allowed to see the results. Empty means the
    /// locked-state default applies.
    pub viewers: Vec<String>,
    pub changeable_votes: bool,
    pub locked: bool,
    pub visible_voters: bool,
    pub visible_voters_wiki: bool,
    /// Heading depth used when rendering the title (1-6).
    pub title_render_level: u8,
    /// Identifier of the icon set selected in the global plugin settings.
    pub icon_set: String,
}

impl VoteConfig {
    pub fn from_parameters(
        parameters: &HashMap<String, String>,
        icon_set: &str,
    ) -> Result<VoteConfig, SurveyError> {
        Ok(VoteConfig {
            voters: parse_list_parameter(parameters.get(KEY_VOTERS)),
            viewers: parse_list_parameter(parameters.get(KEY_VIEWERS)),
            changeable_votes: parse_boolean_parameter(parameters.get(KEY_CHANGEABLE_VOTES)),
            locked: parse_boolean_parameter(parameters.get(KEY_LOCKED)),
            visible_voters: parse_boolean_parameter(parameters.get(KEY_VISIBLE_VOTERS)),
            visible_voters_wiki: parse_boolean_parameter(parameters.get(KEY_VISIBLE_VOTERS_WIKI)),
            title_render_level: parse_title_render_level(parameters.get(KEY_RENDER_TITLE_LEVEL))?,
            icon_set: icon_set.to_string(),
        })
    }
}

/// Splits a comma-separated user/group list, dropping blank entries.
pub fn parse_list_parameter(value: Option<&String>) -> Vec<String> {
    match value {
        Some(raw) => raw
            .split(',')
            .map(|entry| entry.trim())
            .filter(|entry| !entry.is_empty())
            .map(|entry| entry.to_string())
            .collect(),
        None => Vec::new(),
    }
}

/// Boolean parameters are false unless explicitly "true" (case-insensitive).
pub fn parse_boolean_parameter(value: Option<&String>) -> bool {
    match value {
        Some(raw) => raw.trim().eq_ignore_ascii_case("true"),
        None => false,
    }
}

fn parse_title_render_level(value: Option<&String>) -> Result<u8, SurveyError> {
    match value.map(|s| s.trim()) {
        None => Ok(DEFAULT_TITLE_RENDER_LEVEL),
        Some(raw) if raw.is_empty() => Ok(DEFAULT_TITLE_RENDER_LEVEL),
        Some(raw) => match raw.parse::<u8>() {
            Ok(level) if (1..=6).contains(&level) => Ok(level),
            _ => Err(SurveyError::InvalidTitleRenderLevel {
                value: raw.to_string(),
            }),
        },
    }
}

// ********* Vote requests *********

/// A vote submission carried by the host request context.
///
/// Absent request context (a non-interactive render) skips vote recording
/// entirely.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct VoteRequest {
    pub ballot_title: String,
    pub choice: String,
    pub action: String,
}

impl VoteRequest {
    pub fn is_vote_action(&self) -> bool {
        self.action.eq_ignore_ascii_case("vote")
    }
}

// ********* Errors *********

/// Configuration problems that abort the render of one macro instance.
///
/// Authorization denials are not errors: a denied vote is silently ignored
/// and hidden results simply render as hidden.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum SurveyError {
    /// Neither the title parameter nor positional parameter 0 is present.
    MissingTitle,
    InvalidTitleRenderLevel { value: String },
    /// Two choices of one ballot share a description.
    DuplicateChoice { description: String },
    /// Two ballots of one survey share a title.
    DuplicateBallotTitle { title: String },
    StorageKeyTooLong { key: String },
}

impl Error for SurveyError {}

impl Display for SurveyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SurveyError::MissingTitle => {
                write!(f, "Please pass parameter 0 or the title argument (required)!")
            }
            SurveyError::InvalidTitleRenderLevel { value } => {
                write!(
                    f,
                    "renderTitleLevel must be a number between 1 and 6, got '{}'",
                    value
                )
            }
            SurveyError::DuplicateChoice { description } => {
                write!(
                    f,
                    "The choice descriptions must be unique! The row starting with '{}' violated that. Please rename your choices to unique answers!",
                    description
                )
            }
            SurveyError::DuplicateBallotTitle { title } => {
                write!(
                    f,
                    "The ballot title '{}' appears more than once in this survey. Please change one of them!",
                    title
                )
            }
            SurveyError::StorageKeyTooLong { key } => {
                write!(
                    f,
                    "The storage key '{}' exceeds the limit of {} characters. Please shorten the ballot title or the choice descriptions.",
                    key, MAX_STORABLE_KEY_LENGTH
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn lists_drop_blank_entries() {
        let parameters = params(&[(KEY_VOTERS, " alice, ,bob , developers,")]);
        let config = VoteConfig::from_parameters(&parameters, "default").unwrap();
        assert_eq!(config.voters, vec!["alice", "bob", "developers"]);
        assert!(config.viewers.is_empty());
    }

    #[test]
    fn booleans_default_to_false_and_parse_case_insensitively() {
        let parameters = params(&[
            (KEY_CHANGEABLE_VOTES, "TRUE"),
            (KEY_LOCKED, "yes"),
            (KEY_VISIBLE_VOTERS, "true"),
        ]);
        let config = VoteConfig::from_parameters(&parameters, "default").unwrap();
        assert!(config.changeable_votes);
        assert!(!config.locked);
        assert!(config.visible_voters);
        assert!(!config.visible_voters_wiki);
    }

    #[test]
    fn title_render_level_defaults_and_rejects_out_of_range() {
        let config = VoteConfig::from_parameters(&params(&[]), "default").unwrap();
        assert_eq!(config.title_render_level, 3);

        let parameters = params(&[(KEY_RENDER_TITLE_LEVEL, "2")]);
        let config = VoteConfig::from_parameters(&parameters, "default").unwrap();
        assert_eq!(config.title_render_level, 2);

        let parameters = params(&[(KEY_RENDER_TITLE_LEVEL, "7")]);
        assert_eq!(
            VoteConfig::from_parameters(&parameters, "default"),
            Err(SurveyError::InvalidTitleRenderLevel {
                value: "7".to_string()
            })
        );
        let parameters = params(&[(KEY_RENDER_TITLE_LEVEL, "abc")]);
        assert!(VoteConfig::from_parameters(&parameters, "default").is_err());
    }

    #[test]
    fn vote_action_matches_case_insensitively() {
        let request = VoteRequest {
            ballot_title: "Lunch".to_string(),
            choice: "Pizza".to_string(),
            action: "Vote".to_string(),
        };
        assert!(request.is_vote_action());
        let request = VoteRequest {
            action: "unvote".to_string(),
            ..request
        };
        assert!(!request.is_vote_action());
    }
}
