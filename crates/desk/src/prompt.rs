//! Prompt templates.

/// Name under which the response template is published.
pub const SERVICE_RESPONSE_PROMPT: &str = "customer_service_response";

/// Render the customer-service response prompt.
///
/// Steps are listed 1-indexed in the given order.
pub fn service_response_prompt(
    customer_name: &str,
    issue_type: &str,
    resolution_steps: &[String],
) -> String {
    let steps_text = resolution_steps
        .iter()
        .enumerate()
        .map(|(i, step)| format!("{}. {step}", i + 1))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "
You are a professional customer service representative.
Generate a helpful and empathetic response for the customer.

Customer: {customer_name}
Issue Type: {issue_type}

Resolution Steps:
{steps_text}

Guidelines:
- Be professional but warm
- Acknowledge the customer's concern
- Provide clear, actionable steps
- End with an offer for further assistance
- Keep the tone positive and solution-focused

Generate a complete customer service response
following these guidelines.
"
    )
}

/// Split a prompt argument into steps.
///
/// Prompt arguments travel as strings, so a list arrives either as a JSON
/// array of strings or as one step per line.
pub fn parse_steps(raw: &str) -> Vec<String> {
    if let Ok(steps) = serde_json::from_str::<Vec<String>>(raw) {
        return steps;
    }
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
