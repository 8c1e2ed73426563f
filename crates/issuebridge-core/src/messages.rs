//! Localized user-facing text for the callback pages and chat replies.

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
/// Enumerates supported `Locale` values.
pub enum Locale {
    #[default]
    Ja,
    En,
}

impl Locale {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ja => "ja",
            Self::En => "en",
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Locale {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ja" => Ok(Self::Ja),
            "en" => Ok(Self::En),
            other => Err(format!("unsupported locale '{other}' (expected ja or en)")),
        }
    }
}

/// Discord rejects message content longer than this many characters.
pub const MAX_MESSAGE_CHARS: usize = 2000;

/// Message catalog bound to one locale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Messages {
    locale: Locale,
}

impl Messages {
    pub fn new(locale: Locale) -> Self {
        Self { locale }
    }

    pub fn locale(&self) -> Locale {
        self.locale
    }

    fn pick(&self, ja: &'static str, en: &'static str) -> &'static str {
        match self.locale {
            Locale::Ja => ja,
            Locale::En => en,
        }
    }

    pub fn landing_page(&self) -> &'static str {
        "<p>hello</p>"
    }

    pub fn missing_installation_id_page(&self) -> &'static str {
        self.pick(
            "<p>Github App の install からアクセスしてください</p>",
            "<p>Please start from the GitHub App install page.</p>",
        )
    }

    pub fn missing_installation_cookie_page(&self) -> &'static str {
        self.pick(
            "<p>Github App の認証が行われてません</p>",
            "<p>The GitHub App installation step has not been completed (or it expired). Please install the App again.</p>",
        )
    }

    pub fn missing_authorization_code_page(&self) -> &'static str {
        self.pick(
            "<p>Discord の認証から来てください。</p>",
            "<p>Please arrive here through the Discord authorization page.</p>",
        )
    }

    pub fn correlation_replay_page(&self) -> &'static str {
        self.pick(
            "<p>この認証リンクは既に別の Discord アカウントで使用されています。Github App の install からやり直してください</p>",
            "<p>This authorization link was already used by another Discord account. Please restart from the GitHub App install page.</p>",
        )
    }

    pub fn remote_failure_page(&self) -> &'static str {
        self.pick(
            "<p>外部サービスとの通信に失敗しました。時間をおいて再度お試しください</p>",
            "<p>Talking to an upstream service failed. Please try again later.</p>",
        )
    }

    pub fn link_completed_page(&self) -> &'static str {
        self.pick("<p>認証が完了しました</p>", "<p>Authorization complete.</p>")
    }

    pub fn not_authenticated(&self) -> &'static str {
        self.pick("認証されていません", "Not authenticated.")
    }

    pub fn repository_list(&self, clone_urls: &[String]) -> String {
        if clone_urls.is_empty() {
            return self.no_repositories().to_string();
        }
        let header = self.pick(
            "有効なリポジトリは以下です",
            "Repositories available to your installation:",
        );
        let overflow_reserve = self.more_repositories(clone_urls.len()).chars().count() + 1;
        let mut rendered = header.to_string();
        let mut used = rendered.chars().count();
        for (index, url) in clone_urls.iter().enumerate() {
            let cost = url.chars().count() + 1;
            let budget = if index + 1 == clone_urls.len() {
                MAX_MESSAGE_CHARS
            } else {
                MAX_MESSAGE_CHARS - overflow_reserve
            };
            if used + cost > budget {
                rendered.push('\n');
                rendered.push_str(&self.more_repositories(clone_urls.len() - index));
                return rendered;
            }
            rendered.push('\n');
            rendered.push_str(url);
            used += cost;
        }
        rendered
    }

    fn more_repositories(&self, remaining: usize) -> String {
        match self.locale {
            Locale::Ja => format!("…ほか{remaining}件"),
            Locale::En => format!("…and {remaining} more"),
        }
    }

    pub fn no_repositories(&self) -> &'static str {
        self.pick(
            "有効なリポジトリがありません",
            "No repositories are available to your installation.",
        )
    }

    pub fn choose_repository_prompt(&self) -> &'static str {
        self.pick(
            "どのリポジトリにIssueを立てますか？",
            "Which repository should the issue be filed in?",
        )
    }

    pub fn choose_repository_placeholder(&self) -> &'static str {
        self.pick("リポジトリを選んでください", "Choose a repository")
    }

    pub fn issue_form_title(&self) -> &'static str {
        self.pick("Issueを作成します", "Create an issue")
    }

    pub fn issue_title_label(&self) -> &'static str {
        self.pick("issue タイトル", "Issue title")
    }

    pub fn issue_body_label(&self) -> &'static str {
        self.pick("issue 本文", "Issue body")
    }

    pub fn issue_created(&self, issue_url: &str) -> String {
        let header = self.pick("Issueが作成されました", "Issue created");
        format!("{header}\n{issue_url}")
    }

    pub fn no_selection(&self) -> &'static str {
        self.pick(
            "リポジトリが選択されていません。/create_issue からやり直してください",
            "No repository is selected. Run /create_issue again.",
        )
    }

    pub fn repository_lookup_miss(&self, full_name: &str) -> String {
        match self.locale {
            Locale::Ja => format!(
                "リポジトリ {full_name} にアクセスできません。Github App の権限を確認してください"
            ),
            Locale::En => format!(
                "Repository {full_name} is no longer available to your installation. Check the GitHub App permissions."
            ),
        }
    }

    pub fn invalid_submission(&self, field: &str) -> String {
        match self.locale {
            Locale::Ja => format!("入力項目 {field} が空です"),
            Locale::En => format!("The {field} field is required."),
        }
    }

    pub fn remote_failure(&self) -> &'static str {
        self.pick(
            "GitHub との通信に失敗しました。時間をおいて再度お試しください",
            "Talking to GitHub failed. Please try again later.",
        )
    }

    pub fn github_oauth_description(&self) -> &'static str {
        "Github OAuth"
    }

    pub fn check_auth_description(&self) -> &'static str {
        self.pick("認証済みか確認", "Check whether you are linked")
    }

    pub fn create_issue_description(&self) -> &'static str {
        self.pick("Issueを作成します", "Create an issue")
    }
}
