use log::{debug, info, warn};

use survey_voting::*;

use snafu::{prelude::*, Snafu};

use std::collections::HashMap;
use std::fs;

use serde::{Deserialize, Serialize};
use serde_json::json;
use serde_json::Map as JSMap;
use serde_json::Value as JSValue;
use text_diff::print_diff;

pub const VOTE_MACRO: &str = "vote";
pub const SURVEY_MACRO: &str = "survey";

pub const VOTE_TEMPLATE: &str = "templates/macros/vote/votemacro.vm";
pub const SURVEY_TEMPLATE: &str = "templates/macros/survey/surveymacro.vm";
pub const SURVEY_PROBLEMS_TEMPLATE: &str = "templates/macros/survey/surveymacro-renderproblems.vm";

pub const SURVEY_PLUGIN_KEY_ICON_SET: &str = "survey-plugin.iconSet";
pub const SURVEY_PLUGIN_ICON_SET_DEFAULT: &str = "default";

#[derive(Debug, Snafu)]
pub enum MacroError {
    #[snafu(display("{source}"))]
    InvalidConfiguration { source: SurveyError },

    #[snafu(display("The {macro_name}-macro with title '{title}' exists more than one time on this page. That is not allowed. Please change one of them!"))]
    DuplicateMacroTitle { macro_name: String, title: String },

    #[snafu(display("Error while trying to display ballot '{title}': {message}"))]
    RenderFailed { title: String, message: String },

    #[snafu(display("Error opening file {path}"))]
    OpeningFile {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display(""))]
    ParsingJson { source: serde_json::Error },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type MacroResult<T> = Result<T, MacroError>;

// ********* Host boundary *********

/// Template rendering provided by the host wiki engine. Failures are
/// reported back as plain messages and wrapped as macro execution failures.
pub trait TemplateRenderer {
    fn render(&self, template: &str, context: &JSValue) -> Result<String, String>;
}

/// Global plugin settings store.
pub trait PluginSettings {
    fn get(&self, key: &str) -> Option<String>;
}

/// The icon set selected by the administrator, "default" when unset.
pub fn icon_set(settings: &dyn PluginSettings) -> String {
    match settings.get(SURVEY_PLUGIN_KEY_ICON_SET) {
        Some(value) if !value.trim().is_empty() => value,
        _ => SURVEY_PLUGIN_ICON_SET_DEFAULT.to_string(),
    }
}

/// One macro occurrence on the page, as reported by the host markup parser.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct MacroDefinition {
    pub name: String,
    #[serde(default)]
    pub parameters: HashMap<String, String>,
}

// ********* Validation *********

// Scans the same-named macros on the page for a repeated title. Only the
// second and later occurrences of a title fail, the first one still renders.
fn validate_title_uniqueness(
    page_macros: &[MacroDefinition],
    macro_index: usize,
    macro_name: &str,
    own_title: &str,
) -> MacroResult<()> {
    if own_title.is_empty() {
        return Ok(());
    }
    let earlier = page_macros
        .iter()
        .take(macro_index)
        .filter(|definition| definition.name == macro_name)
        .filter(|definition| {
            definition
                .parameters
                .get(KEY_TITLE)
                .map(|raw| raw.trim())
                .unwrap_or("")
                == own_title
        })
        .count();
    if earlier > 0 {
        info!(
            "A {}-macro should not have the same title '{}' twice on the same page",
            macro_name, own_title
        );
        return DuplicateMacroTitleSnafu {
            macro_name,
            title: own_title,
        }
        .fail();
    }
    Ok(())
}

// ********* Visibility *********

fn can_see_results(
    evaluator: &PermissionEvaluator,
    ballot_config: &VoteConfig,
    viewers_raw: &str,
    username: &str,
) -> bool {
    // With no viewers defined, a locked ballot shows its results to everyone.
    if viewers_raw.trim().is_empty() && ballot_config.locked {
        return true;
    }
    evaluator.is_authorized(&ballot_config.viewers, username)
}

// ********* Render contexts *********

fn ballot_to_js(ballot: &Ballot, visible_voters: bool, can_vote: bool) -> JSValue {
    let mut choices: Vec<JSValue> = Vec::new();
    for choice in ballot.choices() {
        let mut entry = JSMap::new();
        entry.insert("description".to_string(), json!(choice.description()));
        entry.insert("voteCount".to_string(), json!(choice.vote_count()));
        entry.insert(
            "percentage".to_string(),
            json!(ballot.percentage_for(choice)),
        );
        // Voter identities only leave the core when they may be shown.
        if visible_voters {
            entry.insert("voters".to_string(), json!(choice.voters()));
        }
        choices.push(JSValue::Object(entry));
    }

    let comments: Vec<JSValue> = ballot
        .comments()
        .iter()
        .map(|comment| json!({"username": comment.username, "comment": comment.comment}))
        .collect();

    json!({
        "title": ballot.title(),
        "renderTitleLevel": ballot.config().title_render_level,
        "locked": ballot.config().locked,
        "changeableVotes": ballot.config().changeable_votes,
        "totalVoteCount": ballot.total_vote_count(),
        "canVote": can_vote,
        "choices": choices,
        "comments": comments,
    })
}

fn render_template(
    renderer: &dyn TemplateRenderer,
    template: &str,
    context: &JSValue,
    title: &str,
    body: &str,
) -> MacroResult<String> {
    match renderer.render(template, context) {
        Ok(output) => Ok(output),
        Err(message) => {
            warn!(
                "Template failure for ballot '{}' with body '{}': {}",
                title, body, message
            );
            RenderFailedSnafu { title, message }.fail()
        }
    }
}

// ********* Macro entry points *********

/// Executes one vote macro occurrence: reconstruct, validate, apply the vote
/// request, evaluate visibility and hand the context to the template engine.
#[allow(clippy::too_many_arguments)]
pub fn execute_vote_macro(
    parameters: &HashMap<String, String>,
    body: &str,
    page_macros: &[MacroDefinition],
    macro_index: usize,
    request: Option<&VoteRequest>,
    username: &str,
    store: &mut dyn ContentPropertyStore,
    directory: &dyn UserDirectory,
    settings: &dyn PluginSettings,
    renderer: &dyn TemplateRenderer,
) -> MacroResult<String> {
    let title = ballot_title_from_parameters(parameters).context(InvalidConfigurationSnafu {})?;
    info!("Executing {}-macro with title '{}'", VOTE_MACRO, title);
    validate_title_uniqueness(page_macros, macro_index, VOTE_MACRO, &title)?;

    let icons = icon_set(settings);
    let mut ballot = reconstruct_ballot(parameters, body, store, &icons)
        .context(InvalidConfigurationSnafu {})?;
    validate_unique_choices(&ballot).context(InvalidConfigurationSnafu {})?;
    validate_max_storable_key_length(&ballot.storage_keys())
        .context(InvalidConfigurationSnafu {})?;

    let evaluator = PermissionEvaluator::new(directory);
    if let Some(request) = request {
        record_vote(&mut ballot, request, username, &evaluator, store);
    }

    let viewers_raw = parameters.get(KEY_VIEWERS).map(|s| s.as_str()).unwrap_or("");
    let visible_voters_raw = parameters
        .get(KEY_VISIBLE_VOTERS)
        .map(|s| s.as_str())
        .unwrap_or("");
    let results_visible = can_see_results(&evaluator, ballot.config(), viewers_raw, username);
    let visible_voters = PermissionEvaluator::can_see_voters(visible_voters_raw, results_visible);
    let can_vote = evaluator.can_vote(username, &ballot);
    debug!(
        "execute_vote_macro: '{}' canSeeResults={} canVote={} visibleVoters={}",
        title, results_visible, can_vote, visible_voters
    );

    let context = json!({
        "ballot": ballot_to_js(&ballot, visible_voters, can_vote),
        "iconSet": icons,
        "canSeeResults": results_visible,
        "canVote": can_vote,
        "visibleVoters": visible_voters,
        "visibleVotersWiki": ballot.config().visible_voters_wiki,
    });
    render_template(renderer, VOTE_TEMPLATE, &context, ballot.title(), body)
}

/// Executes one survey macro occurrence. Duplicate ballot titles within the
/// survey are a warning path that renders the problems template instead of
/// failing the page.
#[allow(clippy::too_many_arguments)]
pub fn execute_survey_macro(
    parameters: &HashMap<String, String>,
    body: &str,
    page_macros: &[MacroDefinition],
    macro_index: usize,
    request: Option<&VoteRequest>,
    username: &str,
    store: &mut dyn ContentPropertyStore,
    directory: &dyn UserDirectory,
    settings: &dyn PluginSettings,
    renderer: &dyn TemplateRenderer,
) -> MacroResult<String> {
    let icons = icon_set(settings);
    let mut survey = reconstruct_survey(parameters, body, store, &icons)
        .context(InvalidConfigurationSnafu {})?;
    let survey_title = survey.title().unwrap_or("").to_string();
    info!("Executing {}-macro with title '{}'", SURVEY_MACRO, survey_title);
    validate_title_uniqueness(page_macros, macro_index, SURVEY_MACRO, &survey_title)?;

    if let Some(duplicate) = first_duplicate_ballot_title(&survey) {
        warn!(
            "The survey '{}' contains the ballot title '{}' more than once",
            survey_title, duplicate
        );
        let problem = SurveyError::DuplicateBallotTitle { title: duplicate };
        let context = json!({
            "surveyTitle": survey_title,
            "problem": problem.to_string(),
        });
        return render_template(
            renderer,
            SURVEY_PROBLEMS_TEMPLATE,
            &context,
            &survey_title,
            body,
        );
    }

    let mut keys: Vec<String> = Vec::new();
    for ballot in survey.ballots() {
        validate_unique_choices(ballot).context(InvalidConfigurationSnafu {})?;
        keys.extend(ballot.storage_keys());
    }
    validate_max_storable_key_length(&keys).context(InvalidConfigurationSnafu {})?;

    let evaluator = PermissionEvaluator::new(directory);
    if let Some(request) = request {
        // Only the ballot named by the request reacts, the others ignore it.
        for ballot in survey.ballots_mut() {
            record_vote(ballot, request, username, &evaluator, store);
        }
    }

    let viewers_raw = parameters.get(KEY_VIEWERS).map(|s| s.as_str()).unwrap_or("");
    let visible_voters_raw = parameters
        .get(KEY_VISIBLE_VOTERS)
        .map(|s| s.as_str())
        .unwrap_or("");
    let results_visible = can_see_results(&evaluator, survey.config(), viewers_raw, username);
    let visible_voters = PermissionEvaluator::can_see_voters(visible_voters_raw, results_visible);

    let ballots: Vec<JSValue> = survey
        .ballots()
        .iter()
        .map(|ballot| {
            ballot_to_js(
                ballot,
                visible_voters,
                evaluator.can_vote(username, ballot),
            )
        })
        .collect();

    let context = json!({
        "survey": {
            "title": survey.title(),
            "ballots": ballots,
        },
        "iconSet": icons,
        "canSeeResults": results_visible,
        "visibleVoters": visible_voters,
        "visibleVotersWiki": survey.config().visible_voters_wiki,
    });
    render_template(renderer, SURVEY_TEMPLATE, &context, &survey_title, body)
}

fn first_duplicate_ballot_title(survey: &Survey) -> Option<String> {
    let mut seen: Vec<&str> = Vec::new();
    for ballot in survey.ballots() {
        if seen.contains(&ballot.title()) {
            return Some(ballot.title().to_string());
        }
        seen.push(ballot.title());
    }
    None
}

// ********* File-backed host adapters for the command line *********

pub mod file_host {
    use crate::macros::*;

    /// The page description consumed by the command line renderer.
    #[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
    pub struct PageFile {
        #[serde(rename = "macroName")]
        pub macro_name: String,
        #[serde(default)]
        pub parameters: HashMap<String, String>,
        #[serde(default)]
        pub body: String,
        #[serde(rename = "pageMacros", default)]
        pub page_macros: Vec<MacroDefinition>,
        /// Position of the rendered occurrence within `pageMacros`.
        #[serde(rename = "macroIndex", default)]
        pub macro_index: usize,
        /// Group name to member usernames.
        #[serde(default)]
        pub groups: HashMap<String, Vec<String>>,
        #[serde(default)]
        pub settings: HashMap<String, String>,
    }

    pub fn read_page(path: &str) -> MacroResult<PageFile> {
        let contents = fs::read_to_string(path).context(OpeningFileSnafu { path })?;
        serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu {})
    }

    /// Property store backed by a flat JSON object on disk.
    #[derive(Eq, PartialEq, Debug, Clone, Default)]
    pub struct JsonPropertyStore {
        properties: HashMap<String, String>,
    }

    impl JsonPropertyStore {
        pub fn new() -> JsonPropertyStore {
            JsonPropertyStore::default()
        }

        pub fn from_map(properties: HashMap<String, String>) -> JsonPropertyStore {
            JsonPropertyStore { properties }
        }

        pub fn load(path: &str) -> MacroResult<JsonPropertyStore> {
            let contents = fs::read_to_string(path).context(OpeningFileSnafu { path })?;
            let properties: HashMap<String, String> =
                serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu {})?;
            Ok(JsonPropertyStore { properties })
        }

        pub fn save(&self, path: &str) -> MacroResult<()> {
            let contents =
                serde_json::to_string_pretty(&self.properties).context(ParsingJsonSnafu {})?;
            fs::write(path, contents).context(OpeningFileSnafu { path })
        }

        pub fn properties(&self) -> &HashMap<String, String> {
            &self.properties
        }
    }

    impl ContentPropertyStore for JsonPropertyStore {
        fn get_property(&self, key: &str) -> Option<String> {
            self.properties.get(key).cloned()
        }

        fn set_property(&mut self, key: &str, value: Option<&str>) {
            match value {
                Some(value) => {
                    self.properties.insert(key.to_string(), value.to_string());
                }
                None => {
                    self.properties.remove(key);
                }
            }
        }
    }

    /// Group directory declared in the page file.
    #[derive(Eq, PartialEq, Debug, Clone, Default)]
    pub struct StaticUserDirectory {
        groups: HashMap<String, Vec<String>>,
    }

    impl StaticUserDirectory {
        pub fn new(groups: HashMap<String, Vec<String>>) -> StaticUserDirectory {
            StaticUserDirectory { groups }
        }
    }

    impl UserDirectory for StaticUserDirectory {
        fn is_member(&self, group: &str, username: &str) -> bool {
            self.groups
                .get(group)
                .map(|members| members.iter().any(|member| member == username))
                .unwrap_or(false)
        }
    }

    #[derive(Eq, PartialEq, Debug, Clone, Default)]
    pub struct StaticSettings {
        pub values: HashMap<String, String>,
    }

    impl PluginSettings for StaticSettings {
        fn get(&self, key: &str) -> Option<String> {
            self.values.get(key).cloned()
        }
    }

    /// Stands in for the wiki template engine: emits the template path and
    /// the context as one JSON document.
    #[derive(Debug, Clone, Default)]
    pub struct JsonRenderer;

    impl TemplateRenderer for JsonRenderer {
        fn render(&self, template: &str, context: &JSValue) -> Result<String, String> {
            serde_json::to_string_pretty(&json!({
                "template": template,
                "context": context,
            }))
            .map_err(|e| e.to_string())
        }
    }
}

// ********* Command line driver *********

fn parse_vote_flag(raw: &str) -> MacroResult<VoteRequest> {
    let parts: Vec<&str> = raw.splitn(3, '/').collect();
    match parts.as_slice() {
        [title, choice, action] => Ok(VoteRequest {
            ballot_title: title.to_string(),
            choice: choice.to_string(),
            action: action.to_string(),
        }),
        _ => whatever!("The --vote flag must look like 'title/choice/action', got {:?}", raw),
    }
}

pub fn run_render(
    page_path: String,
    store_path: Option<String>,
    username: Option<String>,
    vote: Option<String>,
    out: Option<String>,
    reference_path: Option<String>,
) -> MacroResult<()> {
    let page = file_host::read_page(&page_path)?;
    info!(
        "Rendering {}-macro from {:?}",
        page.macro_name, page_path
    );

    let mut store = match &store_path {
        Some(path) => file_host::JsonPropertyStore::load(path)?,
        None => file_host::JsonPropertyStore::new(),
    };
    let directory = file_host::StaticUserDirectory::new(page.groups.clone());
    let settings = file_host::StaticSettings {
        values: page.settings.clone(),
    };
    let renderer = file_host::JsonRenderer;

    let request = match &vote {
        Some(raw) => Some(parse_vote_flag(raw)?),
        None => None,
    };
    let username = username.unwrap_or_default();

    let output = match page.macro_name.as_str() {
        VOTE_MACRO => execute_vote_macro(
            &page.parameters,
            &page.body,
            &page.page_macros,
            page.macro_index,
            request.as_ref(),
            &username,
            &mut store,
            &directory,
            &settings,
            &renderer,
        )?,
        SURVEY_MACRO => execute_survey_macro(
            &page.parameters,
            &page.body,
            &page.page_macros,
            page.macro_index,
            request.as_ref(),
            &username,
            &mut store,
            &directory,
            &settings,
            &renderer,
        )?,
        x => whatever!("Unknown macro name {:?}", x),
    };

    match out.as_deref() {
        Some("stdout") | None => println!("{}", output),
        Some(path) => fs::write(path, &output).context(OpeningFileSnafu { path })?,
    }

    // Votes mutate the store, persist it again.
    if request.is_some() {
        if let Some(path) = &store_path {
            store.save(path)?;
        }
    }

    // The reference rendering, if provided for comparison.
    if let Some(reference_path) = reference_path {
        let reference = fs::read_to_string(&reference_path).context(OpeningFileSnafu {
            path: reference_path.as_str(),
        })?;
        if reference.trim_end() != output.trim_end() {
            warn!("Found differences with the reference rendering");
            print_diff(reference.trim_end(), output.trim_end(), "\n");
            whatever!("Difference detected between the rendering and the reference");
        }
    }

    Ok(())
}
