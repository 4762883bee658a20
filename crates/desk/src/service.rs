//! The customer-service desk as an MCP tool host.

use std::sync::Arc;

use mcp::{
    CallToolParams, CallToolResult, GetPromptParams, GetPromptResult, Handler, JsonRpcError,
    Prompt, PromptArgument, PromptMessage, PromptRole, ReadResourceResult, Resource,
    ResourceContents, ResourceTemplate, ServerInfo, Tool, ToolContent,
};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::account::AccountValue;
use crate::prompt::{SERVICE_RESPONSE_PROMPT, parse_steps, service_response_prompt};
use crate::store::CustomerStore;
use crate::ticket::TicketRequest;
use crate::Error;

pub const SERVER_NAME: &str = "Customer Service Assistant";

pub const GET_RECENT_CUSTOMERS: &str = "get_recent_customers";
pub const CREATE_SUPPORT_TICKET: &str = "create_support_ticket";
pub const CALCULATE_ACCOUNT_VALUE: &str = "calculate_account_value";

const CUSTOMER_SCHEME: &str = "customer://";
const DEFAULT_RECENT_LIMIT: usize = 10;

#[derive(Debug, Deserialize)]
struct RecentCustomersArgs {
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    DEFAULT_RECENT_LIMIT
}

/// Ticket arguments, either flat or wrapped in a `request` object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TicketArgs {
    Wrapped { request: TicketRequest },
    Flat(TicketRequest),
}

impl TicketArgs {
    fn into_request(self) -> TicketRequest {
        match self {
            TicketArgs::Wrapped { request } | TicketArgs::Flat(request) => request,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AccountValueArgs {
    customer_id: String,
    #[serde(default)]
    purchase_history: Vec<f64>,
}

/// Tools, resources and prompts over a shared [`CustomerStore`].
#[derive(Debug, Clone)]
pub struct Desk {
    store: Arc<CustomerStore>,
}

impl Desk {
    pub fn new(store: Arc<CustomerStore>) -> Self {
        Self { store }
    }

    /// A desk over the demo customers.
    pub fn seeded() -> Self {
        Self::new(Arc::new(CustomerStore::seeded()))
    }

    pub fn store(&self) -> &Arc<CustomerStore> {
        &self.store
    }

    async fn get_recent_customers(&self, args: RecentCustomersArgs) -> Result<Value, Error> {
        info!(limit = args.limit, "retrieving recent customers");
        let customers = self.store.recent(args.limit).await;
        to_json(&customers)
    }

    async fn create_support_ticket(&self, args: TicketArgs) -> Result<Value, Error> {
        let request = args.into_request();
        info!(customer = %request.customer_id, "creating ticket");
        let ticket = self.store.create_ticket(request).await?;
        to_json(&ticket)
    }

    fn calculate_account_value(&self, args: AccountValueArgs) -> Result<Value, Error> {
        info!(customer = %args.customer_id, "calculating account value");
        let value = AccountValue::calculate(args.customer_id, &args.purchase_history);
        to_json(&value)
    }
}

impl Handler for Desk {
    fn server_info(&self) -> ServerInfo {
        ServerInfo {
            name: SERVER_NAME.to_string(),
            version: Some(env!("CARGO_PKG_VERSION").to_string()),
        }
    }

    fn instructions(&self) -> Option<String> {
        Some(
            "Look customers up before acting on them, open tickets for issues that need \
             follow-up, and calculate account values when billing comes up."
                .to_string(),
        )
    }

    fn list_tools(&self) -> Vec<Tool> {
        vec![
            Tool {
                name: GET_RECENT_CUSTOMERS.to_string(),
                description: Some("Retrieve recently active customers.".to_string()),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "limit": {
                            "type": "integer",
                            "minimum": 0,
                            "default": DEFAULT_RECENT_LIMIT,
                            "description": "Maximum number of customers to return"
                        }
                    }
                }),
            },
            Tool {
                name: CREATE_SUPPORT_TICKET.to_string(),
                description: Some("Create a new customer support ticket.".to_string()),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "customer_id": { "type": "string" },
                        "subject": { "type": "string" },
                        "description": { "type": "string" },
                        "priority": {
                            "type": "string",
                            "enum": ["low", "normal", "high", "urgent"],
                            "default": "normal"
                        }
                    },
                    "required": ["customer_id", "subject", "description"]
                }),
            },
            Tool {
                name: CALCULATE_ACCOUNT_VALUE.to_string(),
                description: Some(
                    "Calculate total account value and average purchase.".to_string(),
                ),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "customer_id": { "type": "string" },
                        "purchase_history": {
                            "type": "array",
                            "items": { "type": "number" }
                        }
                    },
                    "required": ["customer_id", "purchase_history"]
                }),
            },
        ]
    }

    async fn call_tool(&self, params: CallToolParams) -> Result<CallToolResult, JsonRpcError> {
        let arguments = params.arguments.unwrap_or_else(|| json!({}));

        let outcome = match params.name.as_str() {
            GET_RECENT_CUSTOMERS => self.get_recent_customers(parse_args(arguments)?).await,
            CREATE_SUPPORT_TICKET => self.create_support_ticket(parse_args(arguments)?).await,
            CALCULATE_ACCOUNT_VALUE => self.calculate_account_value(parse_args(arguments)?),
            other => return Err(JsonRpcError::tool_not_found(other)),
        };

        match outcome {
            Ok(value) => Ok(CallToolResult::text(value.to_string())),
            Err(Error::Validation(message)) => Err(JsonRpcError::invalid_params(message)),
            Err(e) => {
                warn!(tool = %params.name, error = %e, "tool rejected request");
                Ok(CallToolResult::error(e.to_string()))
            }
        }
    }

    async fn list_resources(&self) -> Vec<Resource> {
        self.store
            .list()
            .await
            .into_iter()
            .map(|c| Resource {
                uri: format!("{CUSTOMER_SCHEME}{}", c.id),
                name: c.name,
                description: Some("Customer record".to_string()),
                mime_type: Some("application/json".to_string()),
            })
            .collect()
    }

    fn list_resource_templates(&self) -> Vec<ResourceTemplate> {
        vec![ResourceTemplate {
            uri_template: format!("{CUSTOMER_SCHEME}{{customer_id}}"),
            name: "customer".to_string(),
            description: Some("Retrieve customer information by ID.".to_string()),
            mime_type: Some("application/json".to_string()),
        }]
    }

    async fn read_resource(&self, uri: &str) -> Result<ReadResourceResult, JsonRpcError> {
        let customer_id = uri
            .strip_prefix(CUSTOMER_SCHEME)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| JsonRpcError::resource_not_found(uri))?;

        info!(customer = %customer_id, "retrieving customer info");
        let customer = self
            .store
            .get(customer_id)
            .await
            .ok_or_else(|| JsonRpcError::resource_not_found(uri))?;

        let text = serde_json::to_string(&customer).map_err(|e| JsonRpcError::internal(e.to_string()))?;
        Ok(ReadResourceResult {
            contents: vec![ResourceContents {
                uri: uri.to_string(),
                mime_type: Some("application/json".to_string()),
                text: Some(text),
            }],
        })
    }

    fn list_prompts(&self) -> Vec<Prompt> {
        let argument = |name: &str, description: &str| PromptArgument {
            name: name.to_string(),
            description: Some(description.to_string()),
            required: true,
        };
        vec![Prompt {
            name: SERVICE_RESPONSE_PROMPT.to_string(),
            description: Some("Generate a professional customer service response.".to_string()),
            arguments: vec![
                argument("customer_name", "Name to address the customer by"),
                argument("issue_type", "Category of the customer's issue"),
                argument(
                    "resolution_steps",
                    "Steps to resolve the issue, as a JSON array or one per line",
                ),
            ],
        }]
    }

    fn get_prompt(&self, params: GetPromptParams) -> Result<GetPromptResult, JsonRpcError> {
        if params.name != SERVICE_RESPONSE_PROMPT {
            return Err(JsonRpcError::invalid_params(format!(
                "unknown prompt: {}",
                params.name
            )));
        }

        let argument = |name: &str| {
            params
                .arguments
                .get(name)
                .map(String::as_str)
                .ok_or_else(|| JsonRpcError::invalid_params(format!("missing argument: {name}")))
        };
        let customer_name = argument("customer_name")?;
        let issue_type = argument("issue_type")?;
        let steps = parse_steps(argument("resolution_steps")?);

        Ok(GetPromptResult {
            description: Some("Generate a professional customer service response.".to_string()),
            messages: vec![PromptMessage {
                role: PromptRole::User,
                content: ToolContent::Text {
                    text: service_response_prompt(customer_name, issue_type, &steps),
                },
            }],
        })
    }
}

fn parse_args<T: DeserializeOwned>(arguments: Value) -> Result<T, JsonRpcError> {
    serde_json::from_value(arguments).map_err(|e| JsonRpcError::invalid_params(e.to_string()))
}

fn to_json(value: &impl serde::Serialize) -> Result<Value, Error> {
    serde_json::to_value(value).map_err(|e| Error::Domain(format!("failed to encode result: {e}")))
}
