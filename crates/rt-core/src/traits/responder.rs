//! Authentication challenge answering

/// A single prompt inside a challenge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengePrompt {
    /// Text shown to the user
    pub prompt: String,
    /// Whether the answer may be echoed
    pub echo: bool,
}

/// A keyboard-interactive challenge sent by the server
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Challenge {
    pub name: String,
    pub instructions: String,
    pub prompts: Vec<ChallengePrompt>,
}

/// Policy for answering server challenges during authentication
///
/// Called inline while authenticating, so implementations must answer
/// immediately and never wait on a human.
pub trait ChallengeResponder: Send + Sync {
    /// Produce one answer per prompt, or an empty set to decline
    fn respond(&self, challenge: &Challenge, secret: Option<&str>) -> Vec<String>;
}
