mod config;
mod model;
mod permissions;

use log::debug;

use std::collections::HashMap;

pub use crate::config::*;
pub use crate::model::*;
pub use crate::permissions::*;

/// Per-content key-value storage provided by the host, the only durable state
/// this crate depends on.
///
/// One string property per (ballot title, choice description) pair, holding
/// the comma-joined usernames of the voters, absent when there are none.
pub trait ContentPropertyStore {
    fn get_property(&self, key: &str) -> Option<String>;
    /// `None` clears the entry instead of storing a zero-length value.
    fn set_property(&mut self, key: &str, value: Option<&str>);
}

/// Resolves the ballot title from the named parameter, falling back to
/// positional parameter 0.
pub fn ballot_title_from_parameters(
    parameters: &HashMap<String, String>,
) -> Result<String, SurveyError> {
    for key in [KEY_TITLE, KEY_POSITIONAL_TITLE] {
        if let Some(raw) = parameters.get(key) {
            let title = raw.trim();
            if !title.is_empty() {
                return Ok(title.to_string());
            }
        }
    }
    Err(SurveyError::MissingTitle)
}

// A trimmed line qualifies as a choice if it is longer than one character, or
// if its single character looks numeric. Lone stray characters are formatting
// noise in wiki markup. The exact boundary is load-bearing for existing pages.
fn qualifies_as_choice(line: &str) -> bool {
    let mut chars = line.chars();
    match (chars.next(), chars.next()) {
        (None, _) => false,
        (Some(single), None) => single.is_numeric(),
        (Some(_), Some(_)) => true,
    }
}

fn vote_property_key(ballot_title: &str, description: &str) -> String {
    format!("{}{}.{}", VOTE_PREFIX, ballot_title, description)
}

// Replays the persisted voter string of one choice, one vote per comma token.
fn replay_votes(choice: &mut Choice, ballot_title: &str, store: &dyn ContentPropertyStore) {
    let key = vote_property_key(ballot_title, choice.description());
    if let Some(votes) = store.get_property(&key) {
        for voter in votes.split(',') {
            if !voter.is_empty() {
                choice.vote_for(voter);
            }
        }
    }
}

/// Rebuilds a ballot from the macro parameters, the macro body and the
/// previously persisted votes.
///
/// Every non-blank qualifying line of the body becomes one choice, in order
/// of appearance. Duplicate descriptions are not rejected here, see
/// [`validate_unique_choices`].
pub fn reconstruct_ballot(
    parameters: &HashMap<String, String>,
    body: &str,
    store: &dyn ContentPropertyStore,
    icon_set: &str,
) -> Result<Ballot, SurveyError> {
    let title = ballot_title_from_parameters(parameters)?;
    let config = VoteConfig::from_parameters(parameters, icon_set)?;
    let mut ballot = Ballot::new(&title, config);

    for raw_line in body.split(|c| c == '\r' || c == '\n') {
        let line = raw_line.trim();
        if !qualifies_as_choice(line) {
            continue;
        }
        let mut choice = Choice::new(line);
        replay_votes(&mut choice, &title, store);
        ballot.add_choice(choice);
    }
    debug!(
        "reconstruct_ballot: '{}' with {} choices and {} votes",
        ballot.title(),
        ballot.choices().len(),
        ballot.total_vote_count()
    );
    Ok(ballot)
}

/// Writes back the persisted property of one choice after a mutation.
///
/// A choice without voters clears its property rather than leaving a stale
/// zero-length value behind.
pub fn set_vote_content_property(
    choice: &Choice,
    ballot_title: &str,
    store: &mut dyn ContentPropertyStore,
) {
    let key = vote_property_key(ballot_title, choice.description());
    if choice.vote_count() == 0 {
        store.set_property(&key, None);
    } else {
        store.set_property(&key, Some(&choice.voters().join(",")));
    }
}

/// Applies an incoming vote request to the ballot, persisting the affected
/// choices.
///
/// The request is ignored entirely unless it targets this ballot, carries the
/// vote action and the user is eligible. A re-vote unvotes the previous
/// choice first (votes must be changeable for the request to pass the gate at
/// all in that case). At most two writes, no rollback.
pub fn record_vote(
    ballot: &mut Ballot,
    request: &VoteRequest,
    username: &str,
    evaluator: &PermissionEvaluator,
    store: &mut dyn ContentPropertyStore,
) {
    debug!(
        "record_vote: ballot '{}', requested ballot '{}', choice '{}', action '{}'",
        ballot.title(),
        request.ballot_title,
        request.choice,
        request.action
    );

    if request.ballot_title != ballot.title() || !request.is_vote_action() {
        return;
    }
    // Denials are silent, never an error.
    if !evaluator.can_vote(username, ballot) {
        return;
    }

    let title = ballot.title().to_string();
    let changeable = ballot.config().changeable_votes;

    // Re-vote: unvote the previous choice first and persist it, possibly
    // leaving it empty.
    if changeable {
        if let Some(previous) = ballot.get_vote_mut(username) {
            previous.remove_vote_for(username);
            let previous = previous.clone();
            set_vote_content_property(&previous, &title, store);
        }
    }

    if let Some(choice) = ballot.get_choice_mut(&request.choice) {
        choice.vote_for(username);
        let choice = choice.clone();
        set_vote_content_property(&choice, &title, store);
        debug!(
            "record_vote: '{}' voted for '{}' on '{}'",
            username,
            choice.description(),
            title
        );
    }
}

/// Render-time validation: choice descriptions must be unique within one
/// ballot, since they are persistence-key fragments.
pub fn validate_unique_choices(ballot: &Ballot) -> Result<(), SurveyError> {
    let mut seen: Vec<&str> = Vec::new();
    for choice in ballot.choices() {
        if seen.contains(&choice.description()) {
            return Err(SurveyError::DuplicateChoice {
                description: choice.description().to_string(),
            });
        }
        seen.push(choice.description());
    }
    Ok(())
}

/// Checked before any render proceeds: a key the store would truncate fails
/// the render instead.
pub fn validate_max_storable_key_length(keys: &[String]) -> Result<(), SurveyError> {
    for key in keys {
        if VOTE_PREFIX.len() + key.len() > MAX_STORABLE_KEY_LENGTH {
            return Err(SurveyError::StorageKeyTooLong { key: key.clone() });
        }
    }
    Ok(())
}

// ********* Surveys *********

const DEFAULT_CHOICE_DESCRIPTIONS: [&str; 5] = [
    "5-Outstanding",
    "4-More Than Satisfactory",
    "3-Satisfactory",
    "2-Less Than Satisfactory",
    "1-Unsatisfactory",
];

/// The default five-point answer scale of a survey ballot.
pub fn default_survey_choices() -> Vec<Choice> {
    DEFAULT_CHOICE_DESCRIPTIONS
        .iter()
        .map(|description| Choice::new(description))
        .collect()
}

/// Rebuilds a whole survey from the macro body: each qualifying line is one
/// ballot. Segments after `-` separators are custom choice descriptions,
/// otherwise the ballot gets the default answer scale.
///
/// All the ballots share the survey configuration; the survey title itself is
/// optional.
pub fn reconstruct_survey(
    parameters: &HashMap<String, String>,
    body: &str,
    store: &dyn ContentPropertyStore,
    icon_set: &str,
) -> Result<Survey, SurveyError> {
    let config = VoteConfig::from_parameters(parameters, icon_set)?;
    let title = parameters
        .get(KEY_TITLE)
        .map(|raw| raw.trim())
        .filter(|trimmed| !trimmed.is_empty())
        .map(|trimmed| trimmed.to_string());
    let mut survey = Survey::new(title, config.clone());

    for raw_line in body.split(|c| c == '\r' || c == '\n') {
        let line = raw_line.trim();
        if !qualifies_as_choice(line) {
            continue;
        }
        let mut segments = line
            .split('-')
            .map(|segment| segment.trim())
            .filter(|segment| !segment.is_empty());
        let ballot_title = match segments.next() {
            Some(first) => first,
            None => continue,
        };
        let custom: Vec<&str> = segments.collect();

        let mut ballot = Ballot::new(ballot_title, config.clone());
        let mut choices = if custom.is_empty() {
            default_survey_choices()
        } else {
            custom.iter().map(|segment| Choice::new(segment)).collect()
        };
        for choice in choices.iter_mut() {
            replay_votes(choice, ballot_title, store);
        }
        for choice in choices {
            ballot.add_choice(choice);
        }
        for comment in replay_comments(ballot_title, store) {
            ballot.add_comment(comment);
        }
        survey.add_ballot(ballot);
    }
    debug!(
        "reconstruct_survey: '{}' with {} ballots",
        survey.title().unwrap_or(""),
        survey.ballots().len()
    );
    Ok(survey)
}

// Comments are persisted as a commenter list plus one text property per
// commenter.
fn replay_comments(ballot_title: &str, store: &dyn ContentPropertyStore) -> Vec<Comment> {
    let commenters_key = format!("{}{}.commenters", SURVEY_PREFIX, ballot_title);
    let mut comments = Vec::new();
    if let Some(commenters) = store.get_property(&commenters_key) {
        for username in commenters.split(',').filter(|token| !token.is_empty()) {
            let comment_key = format!("{}{}.comment.{}", SURVEY_PREFIX, ballot_title, username);
            if let Some(text) = store.get_property(&comment_key) {
                comments.push(Comment {
                    username: username.to_string(),
                    comment: text,
                });
            }
        }
    }
    comments
}
