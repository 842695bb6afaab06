//! Default challenge responder

use rt_core::traits::{Challenge, ChallengeResponder};

/// Answers every prompt with the pre-supplied secret.
///
/// Without a secret, or when the server sends no prompts, it answers with an
/// empty set instead of waiting for a human.
#[derive(Debug, Clone, Copy, Default)]
pub struct SecretResponder;

impl ChallengeResponder for SecretResponder {
    fn respond(&self, challenge: &Challenge, secret: Option<&str>) -> Vec<String> {
        match secret {
            Some(secret) if !challenge.prompts.is_empty() => challenge
                .prompts
                .iter()
                .map(|_| secret.to_string())
                .collect(),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rt_core::traits::ChallengePrompt;

    fn challenge(prompts: &[&str]) -> Challenge {
        Challenge {
            name: String::new(),
            instructions: String::new(),
            prompts: prompts
                .iter()
                .map(|p| ChallengePrompt {
                    prompt: p.to_string(),
                    echo: false,
                })
                .collect(),
        }
    }

    #[test]
    fn test_answers_each_prompt_with_secret() {
        let answers = SecretResponder.respond(&challenge(&["Password:", "Token:"]), Some("x"));
        assert_eq!(answers, vec!["x", "x"]);
    }

    #[test]
    fn test_no_secret_gives_empty_answers() {
        assert!(SecretResponder
            .respond(&challenge(&["Password:"]), None)
            .is_empty());
    }

    #[test]
    fn test_no_prompts_gives_empty_answers() {
        assert!(SecretResponder.respond(&challenge(&[]), Some("x")).is_empty());
    }
}
