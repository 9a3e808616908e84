//! Component descriptors: the static table of deployable units and their
//! constructor-argument schemas.

use std::{fmt, str::FromStr};

use alloy_core::primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::OrchestratorError;

/// A literal constructor argument.
///
/// Numbers above the TOML integer range are written as strings, either in
/// decimal or `0x`-prefixed hex. A `0x` string of exactly 40 hex digits is an
/// address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LiteralValue {
    Bool(bool),
    Number(#[serde(with = "uint_literal")] U256),
    Address(Address),
    Text(String),
}

impl From<u64> for LiteralValue {
    fn from(value: u64) -> Self {
        LiteralValue::Number(U256::from(value))
    }
}

mod uint_literal {
    use std::fmt;

    use alloy_core::primitives::U256;
    use serde::{
        Deserializer, Serializer,
        de::{Error, Unexpected, Visitor},
    };

    const ADDRESS_HEX_DIGITS: usize = 40;

    pub(super) fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        // TOML integers are signed 64-bit.
        match u64::try_from(*value) {
            Ok(n) if n <= i64::MAX as u64 => serializer.serialize_u64(n),
            _ => serializer.serialize_str(&value.to_string()),
        }
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        deserializer.deserialize_any(UintVisitor)
    }

    /// Parse a decimal or `0x`-prefixed hex string. Address-length hex is rejected.
    fn parse(s: &str) -> Option<U256> {
        let (digits, radix) = match s.strip_prefix("0x") {
            Some(hex) if hex.len() == ADDRESS_HEX_DIGITS => return None,
            Some(hex) => (hex, 16),
            None => (s, 10),
        };
        if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix as u32)) {
            return None;
        }
        U256::from_str_radix(digits, radix).ok()
    }

    struct UintVisitor;

    impl Visitor<'_> for UintVisitor {
        type Value = U256;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("an unsigned integer, or a decimal or 0x-prefixed hex string")
        }

        fn visit_u64<E: Error>(self, v: u64) -> Result<U256, E> {
            Ok(U256::from(v))
        }

        fn visit_i64<E: Error>(self, v: i64) -> Result<U256, E> {
            u64::try_from(v)
                .map(U256::from)
                .map_err(|_| E::invalid_value(Unexpected::Signed(v), &self))
        }

        fn visit_str<E: Error>(self, v: &str) -> Result<U256, E> {
            parse(v).ok_or_else(|| E::invalid_value(Unexpected::Str(v), &self))
        }
    }
}

impl fmt::Display for LiteralValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LiteralValue::Bool(b) => write!(f, "{b}"),
            LiteralValue::Number(n) => write!(f, "{n}"),
            LiteralValue::Address(a) => write!(f, "{a}"),
            LiteralValue::Text(s) => write!(f, "{s:?}"),
        }
    }
}

/// An entry of an account list argument.
///
/// Written as either a hex address or `account:N`, where `N` indexes the
/// ledger's unlocked account list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AccountRef {
    Address(Address),
    Index(usize),
}

const ACCOUNT_INDEX_PREFIX: &str = "account:";

impl FromStr for AccountRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(index) = s.strip_prefix(ACCOUNT_INDEX_PREFIX) {
            return index
                .parse()
                .map(AccountRef::Index)
                .map_err(|e| format!("invalid account index `{index}`: {e}"));
        }
        s.parse()
            .map(AccountRef::Address)
            .map_err(|e| format!("invalid account address `{s}`: {e}"))
    }
}

impl TryFrom<String> for AccountRef {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AccountRef> for String {
    fn from(value: AccountRef) -> Self {
        value.to_string()
    }
}

impl fmt::Display for AccountRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountRef::Address(a) => write!(f, "{a}"),
            AccountRef::Index(i) => write!(f, "{ACCOUNT_INDEX_PREFIX}{i}"),
        }
    }
}

/// Schema of a single constructor argument.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArgSpec {
    /// A fixed value.
    #[serde(rename = "literal")]
    Literal(LiteralValue),
    /// A list of account addresses.
    #[serde(rename = "accounts")]
    AccountList(Vec<AccountRef>),
    /// The address of another component deployed in the same run.
    #[serde(rename = "ref")]
    ComponentRef(String),
}

impl ArgSpec {
    /// Shorthand for a component reference.
    pub fn component(name: impl Into<String>) -> Self {
        ArgSpec::ComponentRef(name.into())
    }

    /// The referenced component, if this argument is a `ComponentRef`.
    pub fn referenced_component(&self) -> Option<&str> {
        match self {
            ArgSpec::ComponentRef(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for ArgSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgSpec::Literal(v) => write!(f, "{v}"),
            ArgSpec::AccountList(accounts) => {
                let accounts: Vec<String> = accounts.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", accounts.join(", "))
            }
            ArgSpec::ComponentRef(name) => write!(f, "&{name}"),
        }
    }
}

/// A deployable unit: a name and its ordered constructor arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComponentDescriptor {
    /// Unique component name. Also the artifact name used by the ledger client.
    pub name: String,
    /// Constructor arguments, in order.
    #[serde(default)]
    pub args: Vec<ArgSpec>,
}

impl ComponentDescriptor {
    pub fn new(name: impl Into<String>, args: Vec<ArgSpec>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    /// Names of the components this one references, in argument order.
    ///
    /// May contain duplicates when the same component is passed twice.
    pub fn references(&self) -> impl Iterator<Item = &str> {
        self.args.iter().filter_map(ArgSpec::referenced_component)
    }
}

/// Registry of component descriptors, keyed by unique name.
///
/// Descriptors are immutable once registered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<ComponentDescriptor>", into = "Vec<ComponentDescriptor>")]
pub struct DescriptorRegistry {
    components: Vec<ComponentDescriptor>,
}

impl DescriptorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a list of descriptors, rejecting duplicate names.
    pub fn from_descriptors(
        descriptors: impl IntoIterator<Item = ComponentDescriptor>,
    ) -> Result<Self, OrchestratorError> {
        let mut registry = Self::new();
        for descriptor in descriptors {
            registry.register(descriptor)?;
        }
        Ok(registry)
    }

    /// Register a descriptor.
    pub fn register(&mut self, descriptor: ComponentDescriptor) -> Result<(), OrchestratorError> {
        if self.contains(&descriptor.name) {
            return Err(OrchestratorError::DuplicateComponent(descriptor.name));
        }
        self.components.push(descriptor);
        Ok(())
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, descriptor: ComponentDescriptor) -> Result<Self, OrchestratorError> {
        self.register(descriptor)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&ComponentDescriptor> {
        self.components.iter().find(|c| c.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Descriptors in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &ComponentDescriptor> {
        self.components.iter()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// The car-insurance component set.
    ///
    /// The role registry is administered by the deployer account; every other
    /// component is wired to the registries it reads from.
    pub fn car_insurance() -> Self {
        let components = vec![
            ComponentDescriptor::new(
                "CarInsuranceRoleRegistry",
                vec![ArgSpec::AccountList(vec![AccountRef::Index(0)])],
            ),
            ComponentDescriptor::new(
                "CarInsurancePolicyRegistry",
                vec![ArgSpec::component("CarInsuranceRoleRegistry")],
            ),
            ComponentDescriptor::new(
                "CarInsurancePremiumCollection",
                vec![
                    ArgSpec::component("CarInsuranceRoleRegistry"),
                    ArgSpec::component("CarInsurancePolicyRegistry"),
                ],
            ),
            ComponentDescriptor::new(
                "CarInsuranceClaimProcessing",
                vec![
                    ArgSpec::component("CarInsuranceRoleRegistry"),
                    ArgSpec::component("CarInsurancePolicyRegistry"),
                ],
            ),
            ComponentDescriptor::new(
                "CarInsurancePayoutDistribution",
                vec![ArgSpec::component("CarInsuranceClaimProcessing")],
            ),
        ];
        Self { components }
    }
}

impl TryFrom<Vec<ComponentDescriptor>> for DescriptorRegistry {
    type Error = OrchestratorError;

    fn try_from(value: Vec<ComponentDescriptor>) -> Result<Self, Self::Error> {
        Self::from_descriptors(value)
    }
}

impl From<DescriptorRegistry> for Vec<ComponentDescriptor> {
    fn from(value: DescriptorRegistry) -> Self {
        value.components
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_names_are_rejected() {
        let result = DescriptorRegistry::from_descriptors([
            ComponentDescriptor::new("Roles", vec![]),
            ComponentDescriptor::new("Roles", vec![]),
        ]);
        assert_eq!(
            result,
            Err(OrchestratorError::DuplicateComponent("Roles".to_string()))
        );
    }

    #[test]
    fn test_references_follow_argument_order() {
        let claims = ComponentDescriptor::new(
            "Claims",
            vec![
                ArgSpec::component("Roles"),
                ArgSpec::Literal(LiteralValue::from(7)),
                ArgSpec::component("Policies"),
            ],
        );
        assert_eq!(claims.references().collect::<Vec<_>>(), ["Roles", "Policies"]);
    }

    #[test]
    fn test_account_ref_parsing() {
        assert_eq!("account:3".parse::<AccountRef>(), Ok(AccountRef::Index(3)));
        assert_eq!(
            "0x00000000000000000000000000000000000000aa".parse::<AccountRef>(),
            Ok(AccountRef::Address(Address::with_last_byte(0xaa)))
        );
        assert!("account:x".parse::<AccountRef>().is_err());
        assert!("not-an-address".parse::<AccountRef>().is_err());
    }

    #[test]
    fn test_registry_from_toml() {
        #[derive(Deserialize)]
        struct Table {
            components: DescriptorRegistry,
        }

        let table: Table = toml::from_str(
            r#"
            [[components]]
            name = "Roles"
            args = [{ accounts = ["account:0", "0x00000000000000000000000000000000000000aa"] }]

            [[components]]
            name = "Policies"
            args = [{ ref = "Roles" }, { literal = 30 }, { literal = "monthly" }, { literal = true }]
            "#,
        )
        .expect("valid descriptor table");

        let policies = table.components.get("Policies").expect("Policies registered");
        assert_eq!(
            policies.args,
            vec![
                ArgSpec::component("Roles"),
                ArgSpec::Literal(LiteralValue::from(30)),
                ArgSpec::Literal(LiteralValue::Text("monthly".to_string())),
                ArgSpec::Literal(LiteralValue::Bool(true)),
            ]
        );
        let roles = table.components.get("Roles").expect("Roles registered");
        assert_eq!(
            roles.args,
            vec![ArgSpec::AccountList(vec![
                AccountRef::Index(0),
                AccountRef::Address(Address::with_last_byte(0xaa)),
            ])]
        );
    }

    #[test]
    fn test_large_numbers_are_not_text() {
        #[derive(Deserialize)]
        struct Component {
            args: Vec<ArgSpec>,
        }

        let component: Component = toml::from_str(
            r#"args = [
                { literal = "100000000000000000000" },
                { literal = "0xff" },
                { literal = "0x00000000000000000000000000000000000000aa" },
                { literal = "12 months" },
            ]"#,
        )
        .expect("valid arguments");

        let wei = U256::from(100_000_000_000_000_000_000u128);
        assert!(wei > U256::from(u64::MAX));
        assert_eq!(
            component.args,
            vec![
                ArgSpec::Literal(LiteralValue::Number(wei)),
                ArgSpec::Literal(LiteralValue::from(0xff)),
                ArgSpec::Literal(LiteralValue::Address(Address::with_last_byte(0xaa))),
                ArgSpec::Literal(LiteralValue::Text("12 months".to_string())),
            ]
        );
    }

    #[test]
    fn test_number_serialization_fits_toml() {
        let small = serde_json::to_value(LiteralValue::from(30)).expect("serializable");
        assert_eq!(small, serde_json::json!(30));

        let wei = LiteralValue::Number(U256::from(100_000_000_000_000_000_000u128));
        let large = serde_json::to_value(&wei).expect("serializable");
        assert_eq!(large, serde_json::json!("100000000000000000000"));
        assert_eq!(serde_json::from_value::<LiteralValue>(large).ok(), Some(wei));
    }

    #[test]
    fn test_car_insurance_table_is_consistent() {
        let registry = DescriptorRegistry::car_insurance();
        assert_eq!(registry.len(), 5);
        for descriptor in registry.iter() {
            for reference in descriptor.references() {
                assert!(registry.contains(reference), "{reference} is not registered");
            }
        }
    }
}
