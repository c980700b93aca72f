//! Static service to resource provider mapping
//!
//! Maps the CLI service token(s) to an ARM provider namespace and a
//! resource-type path. Provider lookup is substring based with the longest
//! matching pattern winning, so `functionapp` beats any shorter pattern it
//! happens to contain. Ties resolve by rule order.

/// Service pattern to provider namespace rules
const PROVIDER_RULES: &[(&str, &str)] = &[
    ("group", "Microsoft.Resources"),
    ("vm", "Microsoft.Compute"),
    ("storage", "Microsoft.Storage"),
    ("webapp", "Microsoft.Web"),
    ("functionapp", "Microsoft.Web"),
    ("keyvault", "Microsoft.KeyVault"),
    ("network", "Microsoft.Network"),
    ("sql", "Microsoft.Sql"),
    ("aks", "Microsoft.ContainerService"),
    ("cosmosdb", "Microsoft.DocumentDB"),
    ("role", "Microsoft.Authorization"),
    ("ad", "Microsoft.Graph"),
    ("monitor", "Microsoft.Insights"),
    ("backup", "Microsoft.RecoveryServices"),
    ("cdn", "Microsoft.Cdn"),
    ("redis", "Microsoft.Cache"),
    ("servicebus", "Microsoft.ServiceBus"),
    ("eventhub", "Microsoft.EventHub"),
    ("iot", "Microsoft.Devices"),
    ("batch", "Microsoft.Batch"),
    ("hdinsight", "Microsoft.HDInsight"),
    ("search", "Microsoft.Search"),
    ("cognitiveservices", "Microsoft.CognitiveServices"),
];

/// Exact service to resource-type path
const RESOURCE_TYPES: &[(&str, &str)] = &[
    ("group", "subscriptions/resourceGroups"),
    ("vm", "virtualMachines"),
    ("storage", "storageAccounts"),
    ("storage account", "storageAccounts"),
    ("storage blob", "storageAccounts/blobServices"),
    ("webapp", "sites"),
    ("functionapp", "sites"),
    ("keyvault", "vaults"),
    ("network", "virtualNetworks"),
    ("network vnet", "virtualNetworks"),
    ("network nsg", "networkSecurityGroups"),
    ("sql", "servers"),
    ("sql server", "servers"),
    ("sql db", "servers/databases"),
    ("aks", "managedClusters"),
    ("cosmosdb", "databaseAccounts"),
    ("role", "roleAssignments"),
    ("role assignment", "roleAssignments"),
    ("role definition", "roleDefinitions"),
    ("ad user", "users"),
];

/// Provider namespace for a service, e.g. `vm` -> `Microsoft.Compute`.
#[must_use]
pub fn provider_for(service: &str) -> Option<&'static str> {
    let service = service.to_lowercase();
    PROVIDER_RULES
        .iter()
        .filter(|(pattern, _)| service.contains(pattern))
        .fold(None, |best: Option<(&str, &'static str)>, &(pattern, namespace)| {
            match best {
                Some((current, _)) if current.len() >= pattern.len() => best,
                _ => Some((pattern, namespace)),
            }
        })
        .map(|(_, namespace)| namespace)
}

/// Resource-type path for a service.
///
/// Tries the exact (possibly compound) service first, then the service's
/// words concatenated, then the raw service string.
#[must_use]
pub fn resource_type_for(service: &str) -> Option<String> {
    let service = service.trim().to_lowercase();
    if service.is_empty() {
        return None;
    }

    if let Some((_, resource_type)) = RESOURCE_TYPES.iter().find(|(key, _)| *key == service) {
        return Some((*resource_type).to_string());
    }

    let words: Vec<&str> = service.split_whitespace().collect();
    if words.len() > 1 {
        return Some(words.concat());
    }

    Some(service)
}
