//! Resolution of `Literal` and `AccountList` arguments.
//!
//! `ComponentRef` arguments are resolved by the executor against the table of
//! components deployed so far; everything else goes through an [`ArgResolver`].

use alloy_core::primitives::Address;

use crate::{AccountRef, LiteralValue, OrchestratorError, ResolvedArg};

/// Resolves non-reference constructor arguments.
pub trait ArgResolver: Send + Sync {
    /// Resolve a literal value of argument `index` of `component`.
    fn resolve_literal(
        &self,
        component: &str,
        index: usize,
        value: &LiteralValue,
    ) -> Result<ResolvedArg, OrchestratorError> {
        let _ = (component, index);
        Ok(ResolvedArg::Value(value.clone()))
    }

    /// Resolve an account list of argument `index` of `component`.
    fn resolve_accounts(
        &self,
        component: &str,
        index: usize,
        accounts: &[AccountRef],
    ) -> Result<ResolvedArg, OrchestratorError>;
}

/// Resolver for descriptor tables that only use literal addresses.
///
/// `account:N` references are rejected with `UnsupportedArgKind`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticResolver;

impl ArgResolver for StaticResolver {
    fn resolve_accounts(
        &self,
        component: &str,
        index: usize,
        accounts: &[AccountRef],
    ) -> Result<ResolvedArg, OrchestratorError> {
        accounts
            .iter()
            .map(|account| match account {
                AccountRef::Address(address) => Ok(*address),
                AccountRef::Index(i) => Err(OrchestratorError::UnsupportedArgKind {
                    component: component.to_string(),
                    index,
                    reason: format!("account:{i} needs a resolver with access to ledger accounts"),
                }),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(ResolvedArg::Accounts)
    }
}

/// Resolver that maps `account:N` to the N-th account of the ledger client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountsResolver {
    accounts: Vec<Address>,
}

impl AccountsResolver {
    pub fn new(accounts: Vec<Address>) -> Self {
        Self { accounts }
    }

    pub fn accounts(&self) -> &[Address] {
        &self.accounts
    }
}

impl ArgResolver for AccountsResolver {
    fn resolve_accounts(
        &self,
        component: &str,
        index: usize,
        accounts: &[AccountRef],
    ) -> Result<ResolvedArg, OrchestratorError> {
        accounts
            .iter()
            .map(|account| match account {
                AccountRef::Address(address) => Ok(*address),
                AccountRef::Index(i) => self.accounts.get(*i).copied().ok_or_else(|| {
                    OrchestratorError::UnsupportedArgKind {
                        component: component.to_string(),
                        index,
                        reason: format!(
                            "account:{i} is out of range, the ledger exposes {} accounts",
                            self.accounts.len()
                        ),
                    }
                }),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(ResolvedArg::Accounts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_resolver_passes_addresses_through() {
        let resolved = StaticResolver
            .resolve_accounts("Roles", 0, &[AccountRef::Address(Address::with_last_byte(7))])
            .expect("literal addresses resolve");
        assert_eq!(resolved, ResolvedArg::Accounts(vec![Address::with_last_byte(7)]));
    }

    #[test]
    fn test_static_resolver_rejects_account_indices() {
        let err = StaticResolver
            .resolve_accounts("Roles", 2, &[AccountRef::Index(0)])
            .unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::UnsupportedArgKind { ref component, index: 2, .. } if component == "Roles"
        ));
    }

    #[test]
    fn test_accounts_resolver_maps_indices() {
        let resolver = AccountsResolver::new(vec![Address::with_last_byte(1), Address::with_last_byte(2)]);
        let resolved = resolver
            .resolve_accounts(
                "Roles",
                0,
                &[AccountRef::Index(1), AccountRef::Address(Address::with_last_byte(9))],
            )
            .expect("in range");
        assert_eq!(
            resolved,
            ResolvedArg::Accounts(vec![Address::with_last_byte(2), Address::with_last_byte(9)])
        );

        let err = resolver
            .resolve_accounts("Roles", 0, &[AccountRef::Index(5)])
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::UnsupportedArgKind);
    }

    #[test]
    fn test_literals_pass_through() {
        let resolved = StaticResolver
            .resolve_literal("Policies", 1, &LiteralValue::from(30))
            .expect("literals always resolve");
        assert_eq!(resolved, ResolvedArg::Value(LiteralValue::from(30)));
    }
}
