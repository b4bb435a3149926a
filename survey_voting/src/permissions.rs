// ********* Permission predicates ***********

use log::debug;

use crate::model::Ballot;

/// Group-membership lookup, resolved by the host user directory.
pub trait UserDirectory {
    fn is_member(&self, group: &str, username: &str) -> bool;
}

/// Stateless predicate engine answering who may vote, see results and see
/// voter identities.
///
/// The predicates are pure so that configuration permutations can be tested
/// without a running host. The only external dependency is the group lookup,
/// injected as a capability.
pub struct PermissionEvaluator<'a> {
    directory: &'a dyn UserDirectory,
}

impl<'a> PermissionEvaluator<'a> {
    pub fn new(directory: &'a dyn UserDirectory) -> PermissionEvaluator<'a> {
        PermissionEvaluator { directory }
    }

    /// An empty list means unrestricted. Entries may name users directly, or
    /// groups the user belongs to. Anonymous users are never authorized.
    pub fn is_authorized(&self, list: &[String], username: &str) -> bool {
        if username.trim().is_empty() {
            return false;
        }
        if list.is_empty() || list.iter().any(|entry| entry == username) {
            return true;
        }
        // Each entry may also be a group name.
        list.iter()
            .any(|entry| self.directory.is_member(entry.trim(), username))
    }

    /// The vote-eligibility gate, re-evaluated on every render and every vote
    /// submission: the user must be an allowed voter and must either not have
    /// voted yet or be allowed to change their vote.
    pub fn can_vote(&self, username: &str, ballot: &Ballot) -> bool {
        if username.trim().is_empty() {
            return false;
        }
        if !self.is_authorized(&ballot.config().voters, username) {
            debug!("can_vote: '{}' is not a permitted voter", username);
            return false;
        }
        !ballot.has_voted(username) || ballot.config().changeable_votes
    }

    /// Voter identities are only shown when the results are, and the raw
    /// visibleVoters parameter is set.
    pub fn can_see_voters(visible_voters: &str, can_see_results: bool) -> bool {
        can_see_results && visible_voters.trim().eq_ignore_ascii_case("true")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{VoteConfig, KEY_CHANGEABLE_VOTES, KEY_VOTERS};
    use crate::model::Choice;
    use std::collections::HashMap;

    struct StaticDirectory {
        groups: Vec<(&'static str, &'static str)>,
    }

    impl UserDirectory for StaticDirectory {
        fn is_member(&self, group: &str, username: &str) -> bool {
            self.groups
                .iter()
                .any(|(g, u)| *g == group && *u == username)
        }
    }

    fn no_groups() -> StaticDirectory {
        StaticDirectory { groups: vec![] }
    }

    fn config_with(pairs: &[(&str, &str)]) -> VoteConfig {
        let parameters: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        VoteConfig::from_parameters(&parameters, "default").unwrap()
    }

    #[test]
    fn blank_user_is_never_authorized() {
        let directory = no_groups();
        let evaluator = PermissionEvaluator::new(&directory);
        assert!(!evaluator.is_authorized(&[], ""));
        assert!(!evaluator.is_authorized(&[], "  "));
    }

    #[test]
    fn empty_list_means_unrestricted() {
        let directory = no_groups();
        let evaluator = PermissionEvaluator::new(&directory);
        assert!(evaluator.is_authorized(&[], "alice"));
    }

    #[test]
    fn literal_entry_authorizes() {
        let directory = no_groups();
        let evaluator = PermissionEvaluator::new(&directory);
        let list = vec!["alice".to_string(), "bob".to_string()];
        assert!(evaluator.is_authorized(&list, "bob"));
        assert!(!evaluator.is_authorized(&list, "mallory"));
    }

    #[test]
    fn entries_fall_back_to_group_lookup() {
        let directory = StaticDirectory {
            groups: vec![("developers", "carol")],
        };
        let evaluator = PermissionEvaluator::new(&directory);
        let list = vec!["developers".to_string()];
        assert!(evaluator.is_authorized(&list, "carol"));
        assert!(!evaluator.is_authorized(&list, "mallory"));
    }

    #[test]
    fn can_vote_with_empty_voters_until_voted() {
        let directory = no_groups();
        let evaluator = PermissionEvaluator::new(&directory);
        let mut ballot = crate::model::Ballot::new("Q", config_with(&[]));
        ballot.add_choice(Choice::new("A"));

        assert!(evaluator.can_vote("alice", &ballot));
        assert!(!evaluator.can_vote("", &ballot));

        ballot.get_choice_mut("A").unwrap().vote_for("alice");
        assert!(!evaluator.can_vote("alice", &ballot));
        // A different user is still eligible.
        assert!(evaluator.can_vote("bob", &ballot));
    }

    #[test]
    fn can_vote_again_when_votes_are_changeable() {
        let directory = no_groups();
        let evaluator = PermissionEvaluator::new(&directory);
        let mut ballot = crate::model::Ballot::new(
            "Q",
            config_with(&[(KEY_CHANGEABLE_VOTES, "true")]),
        );
        ballot.add_choice(Choice::new("A"));
        ballot.get_choice_mut("A").unwrap().vote_for("alice");

        assert!(evaluator.can_vote("alice", &ballot));
    }

    #[test]
    fn voters_list_restricts_regardless_of_history() {
        let directory = no_groups();
        let evaluator = PermissionEvaluator::new(&directory);
        let mut ballot =
            crate::model::Ballot::new("Q", config_with(&[(KEY_VOTERS, "alice,bob")]));
        ballot.add_choice(Choice::new("A"));

        assert!(evaluator.can_vote("alice", &ballot));
        assert!(!evaluator.can_vote("mallory", &ballot));
    }

    #[test]
    fn voters_list_accepts_group_members() {
        let directory = StaticDirectory {
            groups: vec![("staff", "dora")],
        };
        let evaluator = PermissionEvaluator::new(&directory);
        let mut ballot = crate::model::Ballot::new("Q", config_with(&[(KEY_VOTERS, "staff")]));
        ballot.add_choice(Choice::new("A"));

        assert!(evaluator.can_vote("dora", &ballot));
    }

    #[test]
    fn voter_identities_require_results_visibility_and_the_flag() {
        assert!(PermissionEvaluator::can_see_voters("true", true));
        assert!(PermissionEvaluator::can_see_voters("TRUE", true));
        assert!(!PermissionEvaluator::can_see_voters("true", false));
        assert!(!PermissionEvaluator::can_see_voters("", true));
        assert!(!PermissionEvaluator::can_see_voters("false", true));
    }
}
