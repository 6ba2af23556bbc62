//! Message formatting for Slack.
//!
//! Provides utilities for:
//! - Rendering task records into size-limited pages
//! - Building rich messages with Block Kit
//! - The project listing, help and error messages
//!
//! Formatting is pure: the same input always renders the same pages.

use projectbot_github::{ProjectSummary, ProjectTasks, StatusFilter, TaskKind, TaskRecord};
use serde::{Deserialize, Serialize};

use crate::error::{SlackError, SlackResult};

/// Slack's limit for `plain_text` in a header block.
const HEADER_MAX_CHARS: usize = 150;

/// Slack's limit for `mrkdwn` text in a section block.
const SECTION_MAX_CHARS: usize = 3000;

/// Longest project title kept in a page header, leaving room for the
/// number, filter and page index within `HEADER_MAX_CHARS`.
const TITLE_MAX_CHARS: usize = 80;

const ELLIPSIS: &str = "...";

/// Escape the characters Slack treats as control sequences in mrkdwn.
pub fn escape_mrkdwn(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Cut `text` to at most `max_chars` characters, marking the cut.
fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(ELLIPSIS.len());
    let mut truncated: String = text.chars().take(keep).collect();
    truncated.push_str(ELLIPSIS);
    truncated
}

/// Slack Block Kit block types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SlackBlock {
    /// Header block.
    Header { text: SlackTextObject },
    /// Section block (main content).
    Section { text: SlackTextObject },
    /// Context block (small text).
    Context { elements: Vec<SlackContextElement> },
}

/// Slack text object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlackTextObject {
    #[serde(rename = "type")]
    pub text_type: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emoji: Option<bool>,
}

impl SlackTextObject {
    /// Create a plain text object.
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text_type: "plain_text".to_string(),
            text: text.into(),
            emoji: Some(true),
        }
    }

    /// Create a mrkdwn text object.
    pub fn mrkdwn(text: impl Into<String>) -> Self {
        Self {
            text_type: "mrkdwn".to_string(),
            text: text.into(),
            emoji: None,
        }
    }
}

/// Slack context element (for context blocks).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SlackContextElement {
    /// Plain text.
    PlainText { text: String },
    /// Mrkdwn text.
    Mrkdwn { text: String },
}

/// Slack message content with blocks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SlackMessageContent {
    /// Fallback text for notifications.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Block Kit blocks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocks: Option<Vec<SlackBlock>>,
}

/// Builder for creating rich Slack messages.
pub struct SlackMessageBuilder {
    blocks: Vec<SlackBlock>,
    fallback_text: Option<String>,
}

impl SlackMessageBuilder {
    /// Create a new message builder.
    pub fn new() -> Self {
        Self {
            blocks: Vec::new(),
            fallback_text: None,
        }
    }

    /// Set fallback text for notifications.
    pub fn fallback(mut self, text: impl Into<String>) -> Self {
        self.fallback_text = Some(text.into());
        self
    }

    /// Add a header block. Text beyond Slack's header limit is cut.
    pub fn header(mut self, text: impl Into<String>) -> Self {
        self.blocks.push(SlackBlock::Header {
            text: SlackTextObject::plain(truncate_chars(&text.into(), HEADER_MAX_CHARS)),
        });
        self
    }

    /// Add a section with mrkdwn text.
    pub fn section(mut self, text: impl Into<String>) -> Self {
        self.blocks.push(SlackBlock::Section {
            text: SlackTextObject::mrkdwn(truncate_chars(&text.into(), SECTION_MAX_CHARS)),
        });
        self
    }

    /// Add a context block.
    pub fn context(mut self, text: impl Into<String>) -> Self {
        self.blocks.push(SlackBlock::Context {
            elements: vec![SlackContextElement::Mrkdwn { text: text.into() }],
        });
        self
    }

    /// Build the message content.
    pub fn build(self) -> SlackMessageContent {
        SlackMessageContent {
            text: self.fallback_text,
            blocks: Some(self.blocks),
        }
    }
}

impl Default for SlackMessageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Size limits for one rendered page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimits {
    /// Most records on one page.
    pub max_records: usize,
    /// Most characters in a page body.
    pub max_chars: usize,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            max_records: 25,
            // Headroom under Slack's 3000 character section limit.
            max_chars: 2900,
        }
    }
}

impl PageLimits {
    /// Validate the limits.
    pub fn validate(&self) -> SlackResult<()> {
        if self.max_records == 0 {
            return Err(SlackError::Config(
                "pages.max_records must be at least 1".to_string(),
            ));
        }
        if self.max_chars < 80 || self.max_chars > SECTION_MAX_CHARS {
            return Err(SlackError::Config(format!(
                "pages.max_chars must be between 80 and {}",
                SECTION_MAX_CHARS
            )));
        }
        Ok(())
    }
}

/// What a set of task pages is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageContext {
    /// The project the tasks belong to.
    pub project: ProjectSummary,
    /// Filter that was applied, if any.
    pub filter: Option<StatusFilter>,
    /// Whether the project has a Status field.
    pub has_status_field: bool,
}

impl From<&ProjectTasks> for PageContext {
    fn from(tasks: &ProjectTasks) -> Self {
        Self {
            project: tasks.project.clone(),
            filter: tasks.filter,
            has_status_field: tasks.has_status_field,
        }
    }
}

/// One chat message worth of output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    /// Header line.
    pub header: String,
    /// Body lines (mrkdwn).
    pub lines: Vec<String>,
    /// Footer line (mrkdwn).
    pub footer: String,
    /// 1-based page index.
    pub index: usize,
    /// Number of pages in the response.
    pub total: usize,
}

impl RenderedPage {
    /// The page as a single block of text.
    pub fn text(&self) -> String {
        let mut text = String::new();
        text.push_str(&self.header);
        text.push('\n');
        text.push_str(&self.lines.join("\n"));
        if !self.footer.is_empty() {
            text.push('\n');
            text.push_str(&self.footer);
        }
        text
    }

    /// The page as a Block Kit message.
    pub fn to_slack_message(&self) -> SlackMessageContent {
        let mut builder = SlackMessageBuilder::new()
            .fallback(&self.header)
            .header(&self.header)
            .section(self.lines.join("\n"));
        if !self.footer.is_empty() {
            builder = builder.context(&self.footer);
        }
        builder.build()
    }
}

/// Render one task as a list line.
///
/// ```text
/// • <https://github.com/acme/app/issues/12|#12> Fix login · In Progress · Alice, bob
///     _Sprint 4 · bug_
/// ```
fn render_task_line(record: &TaskRecord) -> String {
    let reference = match (&record.kind, &record.url) {
        (TaskKind::DraftIssue, _) => "[Draft]".to_string(),
        (kind, Some(url)) => match kind.number() {
            Some(number) => format!("<{}|#{}>", url, number),
            None => format!("<{}|link>", url),
        },
        (kind, None) => kind
            .number()
            .map(|number| format!("#{}", number))
            .unwrap_or_default(),
    };

    let mut line = format!(
        "• {} {} · {}",
        reference,
        escape_mrkdwn(&record.title),
        escape_mrkdwn(record.status.label())
    );
    if !record.assignees.is_empty() {
        let names: Vec<String> = record.assignees.iter().map(|n| escape_mrkdwn(n)).collect();
        line.push_str(" · ");
        line.push_str(&names.join(", "));
    }
    if let Some(metadata) = &record.metadata {
        line.push_str("\n    _");
        line.push_str(&escape_mrkdwn(metadata));
        line.push('_');
    }
    line
}

/// Split rendered lines into pages honoring both limits.
///
/// Lines are truncated to the character budget first, so every page holds
/// at least one line and every line lands on exactly one page.
fn paginate(lines: Vec<String>, limits: &PageLimits) -> Vec<Vec<String>> {
    let max_records = limits.max_records.max(1);
    let mut pages: Vec<Vec<String>> = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut current_chars = 0;

    for line in lines {
        let line = truncate_chars(&line, limits.max_chars);
        let line_chars = line.chars().count();
        let needed = if current.is_empty() {
            line_chars
        } else {
            current_chars + 1 + line_chars
        };

        if !current.is_empty() && (current.len() >= max_records || needed > limits.max_chars) {
            pages.push(std::mem::take(&mut current));
            current_chars = line_chars;
        } else {
            current_chars = needed;
        }
        current.push(line);
    }

    if !current.is_empty() {
        pages.push(current);
    }
    pages
}

/// Attach headers and footers to paginated lines.
fn assemble(base_header: &str, pages: Vec<Vec<String>>, noun: &str, note: Option<&str>) -> Vec<RenderedPage> {
    let total = pages.len();
    let item_count: usize = pages.iter().map(Vec::len).sum();
    let mut first = 1;

    pages
        .into_iter()
        .enumerate()
        .map(|(i, lines)| {
            let index = i + 1;
            let header = if total > 1 {
                format!("{} · Page {}/{}", base_header, index, total)
            } else {
                base_header.to_string()
            };
            let last = first + lines.len() - 1;
            let mut footer = format!("Showing {}–{} of {} {}", first, last, item_count, noun);
            if let Some(note) = note {
                footer.push_str(" · ");
                footer.push_str(note);
            }
            first = last + 1;
            RenderedPage {
                header,
                lines,
                footer,
                index,
                total,
            }
        })
        .collect()
}

/// Render task records into pages.
///
/// Records keep their order and each appears on exactly one page. An
/// empty input still yields one page saying nothing was found.
pub fn format_task_pages(
    records: &[TaskRecord],
    ctx: &PageContext,
    limits: &PageLimits,
) -> Vec<RenderedPage> {
    let scope = match ctx.filter {
        Some(filter) => filter.label(),
        None => "All statuses",
    };
    let base_header = format!(
        "Project #{} ({}) · {}",
        ctx.project.number,
        truncate_chars(&ctx.project.title, TITLE_MAX_CHARS),
        scope
    );
    let note = if ctx.has_status_field {
        None
    } else {
        Some("_This project has no Status field_")
    };

    if records.is_empty() {
        let message = match ctx.filter {
            Some(filter) => format!("No tasks found with status *{}*.", filter.label()),
            None => "No tasks found.".to_string(),
        };
        return vec![RenderedPage {
            header: base_header,
            lines: vec![message],
            footer: note.unwrap_or_default().to_string(),
            index: 1,
            total: 1,
        }];
    }

    let lines = records.iter().map(render_task_line).collect();
    assemble(&base_header, paginate(lines, limits), "tasks", note)
}

/// Render the organization's project listing.
pub fn format_project_list(projects: &[ProjectSummary], org: &str, limits: &PageLimits) -> Vec<RenderedPage> {
    let base_header = format!("Projects in {}", org);

    if projects.is_empty() {
        return vec![RenderedPage {
            header: base_header,
            lines: vec!["No projects found.".to_string()],
            footer: String::new(),
            index: 1,
            total: 1,
        }];
    }

    let lines = projects
        .iter()
        .map(|project| {
            let mut line = format!(
                "• <{}|#{}> {}",
                project.url,
                project.number,
                escape_mrkdwn(&project.title)
            );
            if project.closed {
                line.push_str(" _(closed)_");
            }
            line
        })
        .collect();
    assemble(&base_header, paginate(lines, limits), "projects", None)
}

/// The `/help` message.
pub fn help_message() -> RenderedPage {
    let lines = [
        "`/tasks [status]` List the tasks of the project linked to this channel.",
        "`/project_tasks <number> [status]` List the tasks of any project by number.",
        "`/projects` List the organization's projects.",
        "`/help` Show this message.",
        "",
        "*Statuses:* `todo`, `in progress`, `in review`, `done`, `no status`. \
         Quotes and `status:` prefixes work too, e.g. `/tasks status:\"In Review\"`.",
    ];
    RenderedPage {
        header: "Project task bot".to_string(),
        lines: lines.iter().map(|l| l.to_string()).collect(),
        footer: String::new(),
        index: 1,
        total: 1,
    }
}

/// Format an error response for Slack.
pub fn format_error_response(message: &str) -> SlackMessageContent {
    SlackMessageBuilder::new()
        .fallback(message)
        .section(format!(":warning: {}", message))
        .build()
}
