use std::fmt;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use serenity::all::{
    ActionRowComponent, Client, Command, CommandInteraction, ComponentInteraction,
    ComponentInteractionDataKind, Context, CreateActionRow, CreateCommand, CreateInputText,
    CreateInteractionResponse, CreateInteractionResponseMessage, CreateModal, CreateSelectMenu,
    CreateSelectMenuKind, CreateSelectMenuOption, EditInteractionResponse, EventHandler,
    GatewayIntents, GuildId, InputTextStyle, Interaction, ModalInteraction, Ready,
};

use issuebridge_core::Messages;

use crate::{
    FlowReply, InteractionFlow, IssueSubmission, RepositoryOption, ISSUE_BODY_INPUT_ID,
    ISSUE_FORM_CUSTOM_ID, ISSUE_TITLE_INPUT_ID, REPO_SELECT_CUSTOM_ID,
};

pub const GITHUB_OAUTH_COMMAND: &str = "github_oauth";
pub const CHECK_AUTH_COMMAND: &str = "check_auth";
pub const CREATE_ISSUE_COMMAND: &str = "create_issue";

#[derive(Clone)]
pub struct DiscordBotConfig {
    pub token: String,
    /// Commands register to this guild when set, globally otherwise.
    pub guild_id: Option<u64>,
}

impl fmt::Debug for DiscordBotConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscordBotConfig")
            .field("guild_id", &self.guild_id)
            .finish_non_exhaustive()
    }
}

pub fn command_definitions(messages: &Messages) -> Vec<CreateCommand> {
    vec![
        CreateCommand::new(GITHUB_OAUTH_COMMAND).description(messages.github_oauth_description()),
        CreateCommand::new(CHECK_AUTH_COMMAND).description(messages.check_auth_description()),
        CreateCommand::new(CREATE_ISSUE_COMMAND).description(messages.create_issue_description()),
    ]
}

/// Gateway event handler that forwards slash commands, select menus and
/// modal submissions to the [`InteractionFlow`].
pub struct DiscordBot {
    flow: Arc<InteractionFlow>,
    guild_id: Option<GuildId>,
}

impl DiscordBot {
    pub fn new(flow: Arc<InteractionFlow>, guild_id: Option<u64>) -> Self {
        Self {
            flow,
            guild_id: guild_id.filter(|id| *id != 0).map(GuildId::new),
        }
    }

    async fn handle_command(&self, ctx: &Context, command: &CommandInteraction) {
        let user_id = command.user.id.get().to_string();
        let name = command.data.name.as_str();
        tracing::debug!(command = name, discord_user_id = %user_id, "slash command");

        if name == GITHUB_OAUTH_COMMAND {
            let response = immediate_response(self.flow.github_oauth());
            if let Err(error) = command.create_response(&ctx.http, response).await {
                tracing::error!(command = name, error = %error, "failed to answer slash command");
            }
            return;
        }

        if name != CHECK_AUTH_COMMAND && name != CREATE_ISSUE_COMMAND {
            tracing::warn!(command = name, "ignoring unknown slash command");
            return;
        }
        if let Err(error) = command.defer(&ctx.http).await {
            tracing::error!(command = name, error = %error, "failed to defer slash command");
            return;
        }
        let outcome = if name == CHECK_AUTH_COMMAND {
            self.flow.check_auth(&user_id).await
        } else {
            self.flow.begin_issue(&user_id).await
        };
        let reply = self.flow.render_outcome(&user_id, outcome);
        if let Err(error) = command.edit_response(&ctx.http, deferred_edit(reply)).await {
            tracing::error!(command = name, error = %error, "failed to deliver slash command reply");
        }
    }

    async fn handle_component(&self, ctx: &Context, component: &ComponentInteraction) {
        if component.data.custom_id != REPO_SELECT_CUSTOM_ID {
            return;
        }
        let user_id = component.user.id.get().to_string();
        let values: &[String] = match &component.data.kind {
            ComponentInteractionDataKind::StringSelect { values } => values.as_slice(),
            _ => &[],
        };
        let outcome = self.flow.select_repository(&user_id, values);
        let response = immediate_response(self.flow.render_outcome(&user_id, outcome));
        if let Err(error) = component.create_response(&ctx.http, response).await {
            tracing::error!(error = %error, "failed to answer repository selection");
        }
    }

    async fn handle_modal(&self, ctx: &Context, modal: &ModalInteraction) {
        if modal.data.custom_id != ISSUE_FORM_CUSTOM_ID {
            return;
        }
        let user_id = modal.user.id.get().to_string();
        let fields = modal
            .data
            .components
            .iter()
            .flat_map(|row| row.components.iter())
            .filter_map(|component| match component {
                ActionRowComponent::InputText(input) => Some((
                    input.custom_id.clone(),
                    input.value.clone().unwrap_or_default(),
                )),
                _ => None,
            });
        let submission = IssueSubmission::from_fields(fields);

        let defer = CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new());
        if let Err(error) = modal.create_response(&ctx.http, defer).await {
            tracing::error!(error = %error, "failed to defer issue submission");
            return;
        }
        let outcome = match submission {
            Ok(submission) => self.flow.submit_issue(&user_id, submission).await,
            Err(error) => Err(error),
        };
        let reply = self.flow.render_outcome(&user_id, outcome);
        if let Err(error) = modal.edit_response(&ctx.http, deferred_edit(reply)).await {
            tracing::error!(error = %error, "failed to deliver issue submission reply");
        }
    }
}

#[async_trait]
impl EventHandler for DiscordBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        tracing::info!(user = %ready.user.name, "discord gateway connected");
        let commands = command_definitions(self.flow.messages());
        let registered = match self.guild_id {
            Some(guild_id) => guild_id
                .set_commands(&ctx.http, commands)
                .await
                .map(|commands| commands.len()),
            None => Command::set_global_commands(&ctx.http, commands)
                .await
                .map(|commands| commands.len()),
        };
        match registered {
            Ok(count) => tracing::info!(
                count,
                guild_id = ?self.guild_id.map(GuildId::get),
                "registered slash commands"
            ),
            Err(error) => tracing::error!(error = %error, "failed to register slash commands"),
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::Command(command) => self.handle_command(&ctx, &command).await,
            Interaction::Component(component) => self.handle_component(&ctx, &component).await,
            Interaction::Modal(modal) => self.handle_modal(&ctx, &modal).await,
            _ => {}
        }
    }
}

fn repository_select_row(placeholder: String, options: Vec<RepositoryOption>) -> CreateActionRow {
    let options = options
        .into_iter()
        .map(|option| CreateSelectMenuOption::new(option.label, option.value))
        .collect();
    CreateActionRow::SelectMenu(
        CreateSelectMenu::new(REPO_SELECT_CUSTOM_ID, CreateSelectMenuKind::String { options })
            .placeholder(placeholder)
            .min_values(1)
            .max_values(1),
    )
}

fn issue_modal(title: String, title_label: String, body_label: String) -> CreateModal {
    CreateModal::new(ISSUE_FORM_CUSTOM_ID, title).components(vec![
        CreateActionRow::InputText(
            CreateInputText::new(InputTextStyle::Short, title_label, ISSUE_TITLE_INPUT_ID)
                .required(true),
        ),
        CreateActionRow::InputText(
            CreateInputText::new(InputTextStyle::Paragraph, body_label, ISSUE_BODY_INPUT_ID)
                .required(true),
        ),
    ])
}

/// Response sent directly as the interaction's first reply.
fn immediate_response(reply: FlowReply) -> CreateInteractionResponse {
    match reply {
        FlowReply::Text(text) => CreateInteractionResponse::Message(
            CreateInteractionResponseMessage::new().content(text),
        ),
        FlowReply::RepositoryPicker {
            prompt,
            placeholder,
            options,
        } => CreateInteractionResponse::Message(
            CreateInteractionResponseMessage::new()
                .content(prompt)
                .components(vec![repository_select_row(placeholder, options)]),
        ),
        FlowReply::IssueForm {
            title,
            title_label,
            body_label,
        } => CreateInteractionResponse::Modal(issue_modal(title, title_label, body_label)),
    }
}

/// Edit applied to a deferred reply. Modals cannot follow a deferral, so a
/// form reply degrades to its title.
fn deferred_edit(reply: FlowReply) -> EditInteractionResponse {
    match reply {
        FlowReply::Text(text) => EditInteractionResponse::new().content(text),
        FlowReply::RepositoryPicker {
            prompt,
            placeholder,
            options,
        } => EditInteractionResponse::new()
            .content(prompt)
            .components(vec![repository_select_row(placeholder, options)]),
        FlowReply::IssueForm { title, .. } => EditInteractionResponse::new().content(title),
    }
}

/// Connects to the Discord gateway and dispatches interactions until the
/// connection ends.
pub async fn run_discord_bot(config: DiscordBotConfig, flow: Arc<InteractionFlow>) -> Result<()> {
    let handler = DiscordBot::new(flow, config.guild_id);
    let mut client = Client::builder(config.token.trim(), GatewayIntents::non_privileged())
        .event_handler(handler)
        .await
        .context("failed to build discord gateway client")?;
    client
        .start()
        .await
        .context("discord gateway client stopped")?;
    Ok(())
}
