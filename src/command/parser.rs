//! Azure CLI command parser
//!
//! Normalizes free-form `az ...` text into a structured [`Command`].

use std::collections::BTreeMap;

use crate::error::{AzpermError, Result};

/// A parsed Azure CLI command
///
/// Immutable once parsed. `full_command` is always `service + " " + operation`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    service: String,
    operation: String,
    parameters: BTreeMap<String, String>,
    full_command: String,
}

impl Command {
    /// Build a command from its parts. Used by tests and by [`parse`].
    #[must_use]
    pub fn new(
        service: impl Into<String>,
        operation: impl Into<String>,
        parameters: BTreeMap<String, String>,
    ) -> Self {
        let service = service.into();
        let operation = operation.into();
        let full_command = format!("{service} {operation}");
        Self {
            service,
            operation,
            parameters,
            full_command,
        }
    }

    /// Service token(s), e.g. `vm` or `storage account`
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Operation verb, e.g. `create`
    #[must_use]
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Parameters keyed by name without the `--` prefix. Flags without a
    /// value map to an empty string.
    #[must_use]
    pub const fn parameters(&self) -> &BTreeMap<String, String> {
        &self.parameters
    }

    /// `service operation`, the cache key for this command
    #[must_use]
    pub fn full_command(&self) -> &str {
        &self.full_command
    }

    /// Service split on whitespace
    pub fn service_words(&self) -> impl Iterator<Item = &str> {
        self.service.split_whitespace()
    }
}

/// Parse a raw command line into a [`Command`].
///
/// A leading `az` token is stripped. If the third token exists and is not a
/// flag, the first two tokens form a compound service (`storage account`).
/// When a parameter name repeats, the last occurrence wins.
pub fn parse(input: &str) -> Result<Command> {
    let mut tokens: Vec<&str> = input.split_whitespace().collect();
    if tokens.first() == Some(&"az") {
        tokens.remove(0);
    }

    if tokens.len() < 2 {
        return Err(AzpermError::Parse {
            input: input.trim().to_string(),
        });
    }

    let (service, operation, rest) = if tokens.len() > 2 && !is_flag(tokens[2]) {
        (
            format!("{} {}", tokens[0], tokens[1]),
            tokens[2],
            &tokens[3..],
        )
    } else {
        (tokens[0].to_string(), tokens[1], &tokens[2..])
    };

    Ok(Command::new(service, operation, parse_parameters(rest)))
}

fn is_flag(token: &str) -> bool {
    token.starts_with("--")
}

fn parse_parameters(tokens: &[&str]) -> BTreeMap<String, String> {
    let mut parameters = BTreeMap::new();
    let mut iter = tokens.iter().peekable();

    while let Some(token) = iter.next() {
        let Some(name) = token.strip_prefix("--") else {
            continue;
        };
        let value = match iter.next_if(|next| !is_flag(next)) {
            Some(value) => (*value).to_string(),
            None => String::new(),
        };
        parameters.insert(name.to_string(), value);
    }

    parameters
}

/// Pull an `az ...` command out of text that mixes it with other content.
///
/// Collection starts at the last standalone `az` word and stops at the first
/// flag once more than three words have been gathered. Returns `None` unless
/// at least three words (including `az`) were collected.
#[must_use]
pub fn extract_az_command(text: &str) -> Option<String> {
    let mut collected: Vec<&str> = Vec::new();
    let mut found = false;

    for word in text.split_whitespace() {
        if word == "az" {
            found = true;
            collected = vec![word];
        } else if found {
            collected.push(word);
            if is_flag(word) && collected.len() > 3 {
                break;
            }
        }
    }

    (found && collected.len() >= 3).then(|| collected.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_group_create_with_parameters() {
        let cmd = parse("az group create --name myRG --location eastus").unwrap();
        assert_eq!(cmd.service(), "group");
        assert_eq!(cmd.operation(), "create");
        assert_eq!(cmd.full_command(), "group create");
        assert_eq!(cmd.parameters().len(), 2);
        assert_eq!(cmd.parameters()["name"], "myRG");
        assert_eq!(cmd.parameters()["location"], "eastus");
    }

    #[test]
    fn test_parse_compound_service() {
        let cmd = parse("az storage account create --name x").unwrap();
        assert_eq!(cmd.service(), "storage account");
        assert_eq!(cmd.operation(), "create");
        assert_eq!(cmd.full_command(), "storage account create");
        assert_eq!(cmd.parameters()["name"], "x");
    }

    #[test]
    fn test_parse_without_az_prefix() {
        let cmd = parse("vm start --name foo").unwrap();
        assert_eq!(cmd.service(), "vm");
        assert_eq!(cmd.operation(), "start");
    }

    #[test]
    fn test_parse_trims_surrounding_whitespace() {
        let cmd = parse("   az vm stop   ").unwrap();
        assert_eq!(cmd.full_command(), "vm stop");
        assert!(cmd.parameters().is_empty());
    }

    #[test]
    fn test_parse_rejects_single_token() {
        assert!(matches!(parse("az vm"), Err(AzpermError::Parse { .. })));
        assert!(matches!(parse("az"), Err(AzpermError::Parse { .. })));
        assert!(matches!(parse("   "), Err(AzpermError::Parse { .. })));
    }

    #[test]
    fn test_parse_flag_without_value_is_empty() {
        let cmd = parse("az vm delete --name foo --yes").unwrap();
        assert_eq!(cmd.parameters()["name"], "foo");
        assert_eq!(cmd.parameters()["yes"], "");
    }

    #[test]
    fn test_parse_consecutive_flags() {
        let cmd = parse("az vm list --all --output table").unwrap();
        assert_eq!(cmd.parameters()["all"], "");
        assert_eq!(cmd.parameters()["output"], "table");
    }

    #[test]
    fn test_parse_duplicate_parameter_last_wins() {
        let cmd = parse("az group create --name first --name second").unwrap();
        assert_eq!(cmd.parameters().len(), 1);
        assert_eq!(cmd.parameters()["name"], "second");
    }

    #[test]
    fn test_parse_keyvault_secret_set() {
        let cmd =
            parse("az keyvault secret set --vault-name myVault --name mySecret --value s3cr3t")
                .unwrap();
        assert_eq!(cmd.service(), "keyvault secret");
        assert_eq!(cmd.operation(), "set");
        assert_eq!(cmd.parameters()["vault-name"], "myVault");
        assert_eq!(cmd.parameters()["value"], "s3cr3t");
    }

    #[test]
    fn test_full_command_single_space_for_compound_service() {
        let cmd = parse("az   storage    blob   upload").unwrap();
        assert_eq!(cmd.full_command(), "storage blob upload");
        assert_eq!(cmd.service_words().count(), 2);
    }

    #[test]
    fn test_parse_ignores_positional_tokens_after_operation() {
        let cmd = parse("az network vnet subnet create --name s1").unwrap();
        assert_eq!(cmd.service(), "network vnet");
        assert_eq!(cmd.operation(), "subnet");
        assert_eq!(cmd.parameters()["name"], "s1");
    }

    #[test]
    fn test_extract_from_mixed_input() {
        let text = "ran this earlier: az vm start --name foo --resource-group rg";
        assert_eq!(
            extract_az_command(text).as_deref(),
            Some("az vm start --name")
        );
    }

    #[test]
    fn test_extract_uses_last_az_word() {
        let text = "az foo then az group delete --name rg";
        assert_eq!(
            extract_az_command(text).as_deref(),
            Some("az group delete --name")
        );
    }

    #[test]
    fn test_extract_requires_three_words() {
        assert_eq!(extract_az_command("just az vm"), None);
        assert_eq!(extract_az_command("no command here"), None);
    }
}
