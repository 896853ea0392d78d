use anyhow::{bail, Result};

#[derive(Debug, Clone, Copy)]
pub struct PromptBudget {
    pub max_prompt_tokens: usize, // whole prompt
    pub max_example_chars: usize, // per sampled mention, before shrinking
    pub min_example_chars: usize, // shrinking stops here
}

impl Default for PromptBudget {
    fn default() -> Self {
        Self {
            max_prompt_tokens: 3_000,
            max_example_chars: 280,
            min_example_chars: 40,
        }
    }
}

pub fn approx_tokens(s: &str) -> usize {
    // heuristic ~4 chars/token
    (s.chars().count() + 3) / 4
}

/// Cut to at most `max_chars` characters, marking the cut with an ellipsis.
pub fn clip_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('…');
    out
}

/// Render with a shrinking per-example cap until the result fits.
pub fn fit_to_budget<F>(budget: PromptBudget, mut render: F) -> Result<String>
where
    F: FnMut(usize) -> String,
{
    let mut cap = budget.max_example_chars.max(budget.min_example_chars);
    loop {
        let prompt = render(cap);
        let tokens = approx_tokens(&prompt);
        if tokens <= budget.max_prompt_tokens {
            return Ok(prompt);
        }
        if cap <= budget.min_example_chars {
            bail!(
                "Prompt budget exceeded: {} > {} tokens even with examples clipped to {} chars (narrow the filters or group by a coarser column)",
                tokens,
                budget.max_prompt_tokens,
                cap
            );
        }
        cap = (cap / 2).max(budget.min_example_chars);
        tracing::debug!("Prompt over budget - tokens={}, retrying with example_cap={}", tokens, cap);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_heuristic() {
        assert_eq!(approx_tokens(""), 0);
        assert_eq!(approx_tokens("abcd"), 1);
        assert_eq!(approx_tokens("abcde"), 2);
    }

    #[test]
    fn clip_keeps_short_text() {
        assert_eq!(clip_chars("corto", 10), "corto");
        assert_eq!(clip_chars("abcdefghij", 5), "abcd…");
        assert_eq!(clip_chars("abcdefghij", 5).chars().count(), 5);
    }

    #[test]
    fn shrinks_examples_before_failing() {
        let budget = PromptBudget { max_prompt_tokens: 30, max_example_chars: 400, min_example_chars: 40 };
        let long = "x".repeat(400);
        let mut caps = Vec::new();
        let out = fit_to_budget(budget, |cap| {
            caps.push(cap);
            clip_chars(&long, cap)
        })
        .unwrap();
        assert!(approx_tokens(&out) <= 30);
        assert_eq!(caps, vec![400, 200, 100]);
    }

    #[test]
    fn fails_when_floor_reached() {
        let budget = PromptBudget { max_prompt_tokens: 5, max_example_chars: 80, min_example_chars: 40 };
        let err = fit_to_budget(budget, |_| "y".repeat(500)).unwrap_err();
        assert!(err.to_string().contains("Prompt budget exceeded"));
    }
}
