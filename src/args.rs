use clap::Parser;

/// Renders wiki voting and survey macros from local page data.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path) JSON description of the page: the macro name, its parameters, its body,
    /// the other macro occurrences on the page, and optionally the group directory and the
    /// global plugin settings.
    #[clap(short, long, value_parser)]
    pub page: String,

    /// (file path, optional) JSON key-value store holding the persisted vote properties.
    /// Rewritten in place after a vote has been recorded.
    #[clap(short, long, value_parser)]
    pub store: Option<String>,

    /// (username, optional) The user viewing the page. Anonymous when not specified.
    #[clap(short, long, value_parser)]
    pub user: Option<String>,

    /// (title/choice/action, optional) A vote request to apply, e.g. 'Lunch/Pizza/vote'.
    #[clap(long, value_parser)]
    pub vote: Option<String>,

    /// (file path, 'stdout' or empty) If specified, the rendered output will be written to the given
    /// location instead of the standard output.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// (file path) A reference rendering. If provided, wikivote will check that the
    /// produced output matches the reference.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
