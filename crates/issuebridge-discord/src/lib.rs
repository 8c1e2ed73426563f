//! Discord slash-command surface: account checks and issue filing through a
//! repository picker followed by a title/body modal.

mod discord_bot;
mod interaction_flow;

pub use discord_bot::{
    command_definitions, run_discord_bot, DiscordBot, DiscordBotConfig, CHECK_AUTH_COMMAND,
    CREATE_ISSUE_COMMAND, GITHUB_OAUTH_COMMAND,
};
pub use interaction_flow::{
    FlowReply, FlowState, InteractionFlow, IssueSubmission, RepositoryOption,
    ISSUE_BODY_INPUT_ID, ISSUE_FORM_CUSTOM_ID, ISSUE_TITLE_INPUT_ID, MAX_SELECT_OPTIONS,
    REPO_SELECT_CUSTOM_ID,
};
