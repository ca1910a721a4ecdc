use std::time::Duration;
use tracing::{info, warn};

use handbook_core::error::{Error, Result};
use handbook_core::traits::LanguageModel;

const PROMPT_TEMPLATE: &str = r#"You are an experienced HR advisor helping employees understand company policy.

Answer the employee's question using only the handbook excerpts below.

Handbook excerpts:
{context}

Question:
{question}

How to read list-style handbook policies:

1. Take explicit statements literally:
   - "Required in office: X, Y" means the employee must be in the office on X and Y.
   - "Prohibited: A, B" means A and B are not allowed.
   - "Up to N" is a maximum, not an obligation.

2. What a rule does not restrict is permitted:
   - "Required in office: Mondays and Thursdays" requires those two days only.
   - Tuesday, Wednesday and Friday remain open for other arrangements such as remote work.
   - Do not read a requirement as a list of the only days something is allowed.

3. Combine rules when several apply:
   - "Required in office: Mondays and Thursdays" plus "Up to 3 remote days per week"
     leaves Tuesday, Wednesday and Friday as the days available for remote work.

4. When answering:
   - Reply in the language the question was asked in.
   - Start with a direct "Yes" or "No" when the question allows it, then explain.
   - State any conditions clearly.
   - Say the handbook does not mention something only if it is truly absent.

Answer:"#;

pub fn build_prompt(context: &str, question: &str) -> String {
    PROMPT_TEMPLATE.replace("{context}", context).replace("{question}", question)
}

/// Ask `model` to answer from `context`. Provider errors, timeouts and empty
/// completions are all `Error::Generation`.
pub async fn generative_answer(
    model: &dyn LanguageModel,
    question: &str,
    context: &str,
    timeout: Duration,
) -> Result<String> {
    let prompt = build_prompt(context, question);
    let completion = match tokio::time::timeout(timeout, model.complete(&prompt)).await {
        Ok(Ok(text)) => text,
        Ok(Err(e)) => {
            warn!(model = model.model_id(), error = %e, "language model call failed");
            return Err(Error::Generation(format!("{}: {e:#}", model.model_id())));
        }
        Err(_) => {
            warn!(model = model.model_id(), timeout_secs = timeout.as_secs(), "language model timed out");
            return Err(Error::Generation(format!("{} timed out after {}s", model.model_id(), timeout.as_secs())));
        }
    };
    let answer = completion.trim();
    if answer.is_empty() {
        return Err(Error::Generation(format!("{} returned an empty answer", model.model_id())));
    }
    info!(model = model.model_id(), chars = answer.len(), "generated answer");
    Ok(answer.to_string())
}
