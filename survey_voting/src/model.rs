// ********* Ballot model ***********

use crate::config::VoteConfig;

/// One answer option and the set of users who picked it.
///
/// The description doubles as the persistence-key fragment for this choice,
/// so it is immutable after construction.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Choice {
    description: String,
    // Insertion-ordered, a username appears at most once.
    voters: Vec<String>,
}

impl Choice {
    pub fn new(description: &str) -> Choice {
        Choice {
            description: description.to_string(),
            voters: Vec::new(),
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Registers a vote. Voting again for the same choice is a no-op.
    pub fn vote_for(&mut self, username: &str) {
        if !self.has_voted_for(username) {
            self.voters.push(username.to_string());
        }
    }

    /// Removes a vote if present, no-op otherwise.
    pub fn remove_vote_for(&mut self, username: &str) {
        self.voters.retain(|voter| voter != username);
    }

    pub fn has_voted_for(&self, username: &str) -> bool {
        self.voters.iter().any(|voter| voter == username)
    }

    pub fn vote_count(&self) -> usize {
        self.voters.len()
    }

    pub fn voters(&self) -> &[String] {
        &self.voters
    }
}

/// A free-text comment left on a ballot.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Comment {
    pub username: String,
    pub comment: String,
}

/// A titled question with an ordered list of choices.
///
/// Reconstructed from the macro body and the persisted votes on every render,
/// mutated in place while a vote request is recorded, and discarded at the end
/// of the render. Only the per-choice voter strings are ever persisted.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Ballot {
    title: String,
    config: VoteConfig,
    choices: Vec<Choice>,
    comments: Vec<Comment>,
}

impl Ballot {
    pub fn new(title: &str, config: VoteConfig) -> Ballot {
        Ballot {
            title: title.to_string(),
            config,
            choices: Vec::new(),
            comments: Vec::new(),
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn config(&self) -> &VoteConfig {
        &self.config
    }

    /// Appends a choice. Duplicate descriptions are not rejected here; the
    /// render validates uniqueness before any state is mutated.
    pub fn add_choice(&mut self, choice: Choice) {
        self.choices.push(choice);
    }

    pub fn choices(&self) -> &[Choice] {
        &self.choices
    }

    /// First choice with a matching description.
    pub fn get_choice(&self, description: &str) -> Option<&Choice> {
        self.choices
            .iter()
            .find(|choice| choice.description() == description)
    }

    pub(crate) fn get_choice_mut(&mut self, description: &str) -> Option<&mut Choice> {
        self.choices
            .iter_mut()
            .find(|choice| choice.description() == description)
    }

    /// The choice the user voted for, if any. First match in choice order:
    /// a username listed under several choices is a data-integrity problem
    /// that is not defended against beyond this.
    pub fn get_vote(&self, username: &str) -> Option<&Choice> {
        self.choices
            .iter()
            .find(|choice| choice.has_voted_for(username))
    }

    pub(crate) fn get_vote_mut(&mut self, username: &str) -> Option<&mut Choice> {
        self.choices
            .iter_mut()
            .find(|choice| choice.has_voted_for(username))
    }

    pub fn has_voted(&self, username: &str) -> bool {
        self.get_vote(username).is_some()
    }

    pub fn total_vote_count(&self) -> usize {
        self.choices.iter().map(|choice| choice.vote_count()).sum()
    }

    /// Integer percentage of the total votes cast for the given choice,
    /// truncating, 0 when no votes were cast at all.
    pub fn percentage_for(&self, choice: &Choice) -> usize {
        let total = self.total_vote_count();
        if total == 0 {
            0
        } else {
            choice.vote_count() * 100 / total
        }
    }

    /// All the `{title}.{choice}` key fragments this ballot would read or
    /// write, used for the storable-key-length precondition.
    pub fn storage_keys(&self) -> Vec<String> {
        self.choices
            .iter()
            .map(|choice| format!("{}.{}", self.title, choice.description()))
            .collect()
    }

    pub fn comments(&self) -> &[Comment] {
        &self.comments
    }

    pub fn add_comment(&mut self, comment: Comment) {
        self.comments.push(comment);
    }
}

/// An ordered collection of ballots sharing one configuration.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Survey {
    title: Option<String>,
    config: VoteConfig,
    ballots: Vec<Ballot>,
}

impl Survey {
    pub fn new(title: Option<String>, config: VoteConfig) -> Survey {
        Survey {
            title,
            config,
            ballots: Vec::new(),
        }
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn config(&self) -> &VoteConfig {
        &self.config
    }

    pub fn add_ballot(&mut self, ballot: Ballot) {
        self.ballots.push(ballot);
    }

    pub fn ballots(&self) -> &[Ballot] {
        &self.ballots
    }

    pub fn ballots_mut(&mut self) -> &mut [Ballot] {
        &mut self.ballots
    }

    pub fn get_ballot(&self, title: &str) -> Option<&Ballot> {
        self.ballots.iter().find(|ballot| ballot.title() == title)
    }
}
