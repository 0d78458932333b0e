//! Step builders keyed by capability.
//!
//! Each job description of a node becomes one shell step. The builder is
//! chosen by the first registered capability the node carries; nodes with
//! none of them get a generic step.

use crate::catalog::TaskNode;

use super::document::Step;

/// Longest step name kept before truncation, in characters.
const STEP_NAME_LIMIT: usize = 50;

/// What a step builder receives.
#[derive(Debug, Clone, Copy)]
pub struct StepInput<'a> {
    /// The node the step belongs to
    pub node: &'a TaskNode,

    /// Job description being turned into a step
    pub description: &'a str,

    /// MCP service the step should call
    pub service: &'a str,

    /// CLI tool invoked by the step
    pub cli_tool: &'a str,
}

/// Produces the shell lines of a step.
pub type ScriptBuilder = fn(&StepInput<'_>) -> Vec<String>;

/// A capability-specific step kind.
#[derive(Debug, Clone)]
pub struct StepKind {
    /// Capability tag that selects this kind
    pub capability: String,

    /// Step name prefix (`T2I`, `I2V`, ...)
    pub label: String,

    /// Service-category prefix of the services this kind calls
    pub service_prefix: String,

    /// Service used when the node recorded none of this category
    pub fallback_service: String,

    /// Script builder
    pub build: ScriptBuilder,
}

impl StepKind {
    /// Create a step kind.
    pub fn new(
        capability: &str,
        label: &str,
        service_prefix: &str,
        fallback_service: &str,
        build: ScriptBuilder,
    ) -> Self {
        Self {
            capability: capability.to_string(),
            label: label.to_string(),
            service_prefix: service_prefix.to_string(),
            fallback_service: fallback_service.to_string(),
            build,
        }
    }

    /// The service a node's step calls.
    pub fn service_for<'a>(&'a self, node: &'a TaskNode) -> &'a str {
        let prefix = format!("{}-", self.service_prefix);
        node.mcp_services
            .iter()
            .find(|s| s.starts_with(&prefix))
            .map_or(self.fallback_service.as_str(), String::as_str)
    }
}

/// Capability step kinds in precedence order.
#[derive(Debug, Clone)]
pub struct StepRegistry {
    kinds: Vec<StepKind>,
}

impl Default for StepRegistry {
    fn default() -> Self {
        Self {
            kinds: vec![
                StepKind::new("text_to_image", "T2I", "t2i", "t2i-fal-imagen4-ultra", text_to_image),
                StepKind::new("image_to_video", "I2V", "i2v", "i2v-fal-hailuo-02-pro", image_to_video),
                StepKind::new("text_to_music", "T2M", "t2m", "t2m-google-lyria", text_to_music),
                StepKind::new("video_to_audio", "V2A", "v2a", "v2a-fal-metavoice-v1", video_to_audio),
            ],
        }
    }
}

impl StepRegistry {
    /// A registry without capability kinds; every step is generic.
    pub fn empty() -> Self {
        Self { kinds: Vec::new() }
    }

    /// Append a kind with the lowest precedence, replacing any kind for the
    /// same capability.
    pub fn register(&mut self, kind: StepKind) {
        self.kinds.retain(|k| k.capability != kind.capability);
        self.kinds.push(kind);
    }

    /// Registered kinds in precedence order.
    pub fn kinds(&self) -> &[StepKind] {
        &self.kinds
    }

    /// The kind used for a node, if any.
    pub fn select(&self, node: &TaskNode) -> Option<&StepKind> {
        self.kinds.iter().find(|k| node.has_capability(&k.capability))
    }

    /// Build the steps of one node: one per job description, or one from the
    /// node's name when it has none.
    pub fn steps_for(&self, node: &TaskNode, cli_tool: &str) -> Vec<Step> {
        if node.jobs.is_empty() {
            return vec![self.build(node, &node.name, cli_tool)];
        }
        node.jobs.iter().map(|job| self.build(node, job, cli_tool)).collect()
    }

    /// Build the step for one job description.
    pub fn build(&self, node: &TaskNode, description: &str, cli_tool: &str) -> Step {
        let title = step_title(description);
        match self.select(node) {
            Some(kind) => {
                let input =
                    StepInput { node, description, service: kind.service_for(node), cli_tool };
                Step::script(format!("{}: {}", kind.label, title), &(kind.build)(&input))
            }
            None => {
                let input = StepInput { node, description, service: "", cli_tool };
                Step::script(format!("Execute: {title}"), &generic(&input))
            }
        }
    }
}

/// Step name for a job description.
pub fn step_title(description: &str) -> String {
    let description = plain_text(description);
    if description.chars().count() > STEP_NAME_LIMIT {
        let head: String = description.chars().take(STEP_NAME_LIMIT).collect();
        format!("{head}...")
    } else {
        description
    }
}

/// Template text with heredoc markers broken up.
///
/// Emitted workflows must never contain `<<`, even inside echoed strings.
pub fn plain_text(text: &str) -> String {
    let mut text = text.to_string();
    while text.contains("<<") {
        text = text.replace("<<", "< <");
    }
    text
}

/// Escape text for use inside a double-quoted shell string.
pub fn shell_escape(text: &str) -> String {
    let text = plain_text(text);
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' | '"' | '$' | '`' => {
                escaped.push('\\');
                escaped.push(c);
            }
            '\n' | '\r' => escaped.push(' '),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn header(message: &str, input: &StepInput<'_>) -> Vec<String> {
    vec![
        format!("echo \"{message}\""),
        format!("echo \"Job: {}\"", shell_escape(input.description)),
    ]
}

fn text_to_image(input: &StepInput<'_>) -> Vec<String> {
    let mut lines = header("Executing text-to-image generation...", input);
    lines.push(format!("echo \"Using MCP service: {}\"", input.service));
    lines.push(format!(
        "{} --mcp {} --prompt \"Generate image: ${{{{ inputs.user_prompt || env.REQUIREMENTS }}}}\" --output \"outputs/generated_image_${{{{ github.run_number }}}}.png\"",
        input.cli_tool, input.service
    ));
    lines
}

fn image_to_video(input: &StepInput<'_>) -> Vec<String> {
    let mut lines = header("Executing image-to-video generation...", input);
    lines.extend([
        "INPUT_IMAGE=\"outputs/generated_image_${{ github.run_number }}.png\"".to_string(),
        "if [ ! -f \"$INPUT_IMAGE\" ]; then".to_string(),
        "  INPUT_IMAGE=$(find outputs -name \"*.png\" -o -name \"*.jpg\" | head -1)".to_string(),
        "fi".to_string(),
        "if [ -n \"$INPUT_IMAGE\" ]; then".to_string(),
        format!(
            "  {} --mcp {} --input \"$INPUT_IMAGE\" --output \"outputs/generated_video_${{{{ github.run_number }}}}.mp4\"",
            input.cli_tool, input.service
        ),
        "fi".to_string(),
    ]);
    lines
}

fn text_to_music(input: &StepInput<'_>) -> Vec<String> {
    let mut lines = header("Executing text-to-music generation...", input);
    lines.push(format!(
        "{} --mcp {} --prompt \"Generate BGM: ${{{{ inputs.user_prompt || env.REQUIREMENTS }}}}\" --output \"outputs/generated_music_${{{{ github.run_number }}}}.mp3\"",
        input.cli_tool, input.service
    ));
    lines
}

fn video_to_audio(input: &StepInput<'_>) -> Vec<String> {
    let mut lines = header("Executing video-to-audio extraction...", input);
    lines.extend([
        "INPUT_VIDEO=$(find outputs -name \"*.mp4\" | head -1)".to_string(),
        "if [ -n \"$INPUT_VIDEO\" ]; then".to_string(),
        format!(
            "  {} --mcp {} --input \"$INPUT_VIDEO\" --output \"outputs/extracted_audio_${{{{ github.run_number }}}}.wav\"",
            input.cli_tool, input.service
        ),
        "fi".to_string(),
    ]);
    lines
}

fn generic(input: &StepInput<'_>) -> Vec<String> {
    let capabilities: Vec<&str> = input.node.capabilities.iter().map(String::as_str).collect();
    let mut lines = header("Executing general task...", input);
    lines.extend([
        format!("echo \"Capabilities: {}\"", capabilities.join(",")),
        "TASK_DIR=\"outputs/${{ env.CURRENT_TASK || 'general' }}\"".to_string(),
        "mkdir -p \"$TASK_DIR\"".to_string(),
        "echo \"${{ github.run_number }}\" > \"$TASK_DIR/execution_id.txt\"".to_string(),
    ]);
    lines
}
