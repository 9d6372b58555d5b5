//! # Services Context
//!
//! Every engine in the core (ledger, policy store, risk engine, webhook
//! manager, orchestrator) is constructed exactly once here and shared by
//! `Arc`. There are no lazily-initialized globals: the boundary receives
//! a [`Services`] value at startup and threads it into handlers.
//!
//! This module also hosts the provisioning flows that cut across
//! registries — creating an agent wires up a wallet, a policy, and the
//! creation events in one place.

use rust_decimal::Decimal;
use std::sync::Arc;

use serde_json::json;

use crate::config;
use crate::entity::{Agent, Merchant, PrincipalRegistry, VirtualCard, Wallet, WalletError, WalletRegistry};
use crate::ledger::{LedgerEngine, LedgerError};
use crate::payment::{FeePricer, PaymentOrchestrator};
use crate::policy::{PolicyStore, SpendingPolicy, TrustTier};
use crate::risk::RiskEngine;
use crate::settlement::SettlementDriver;
use crate::webhook::{Event, EventType, WebhookManager};

/// The assembled core. Cheap to clone the `Arc`s out of; construct once.
pub struct Services {
    pub ledger: Arc<LedgerEngine>,
    pub wallets: Arc<WalletRegistry>,
    pub principals: Arc<PrincipalRegistry>,
    pub policies: Arc<PolicyStore>,
    pub risk: Arc<RiskEngine>,
    pub webhooks: Arc<WebhookManager>,
    pub orchestrator: Arc<PaymentOrchestrator>,
}

/// Optional wiring for [`Services`] construction.
#[derive(Default)]
pub struct ServicesBuilder {
    fee_pricer: Option<Arc<dyn FeePricer>>,
    settlement: Option<Arc<dyn SettlementDriver>>,
}

impl ServicesBuilder {
    pub fn fee_pricer(mut self, pricer: Arc<dyn FeePricer>) -> Self {
        self.fee_pricer = Some(pricer);
        self
    }

    pub fn settlement_driver(mut self, driver: Arc<dyn SettlementDriver>) -> Self {
        self.settlement = Some(driver);
        self
    }

    pub fn build(self) -> Arc<Services> {
        let ledger = Arc::new(LedgerEngine::new());
        let wallets = Arc::new(WalletRegistry::new());
        let principals = Arc::new(PrincipalRegistry::new());
        let policies = Arc::new(PolicyStore::new());
        let risk = Arc::new(RiskEngine::new());
        let webhooks = Arc::new(WebhookManager::new());

        // The fee pool is an ordinary wallet with a fixed, configured id.
        wallets.insert(Wallet::with_id(
            config::FEE_POOL_WALLET_ID,
            "system",
            config::DEFAULT_CURRENCY,
        ));

        let mut orchestrator = PaymentOrchestrator::new(
            Arc::clone(&ledger),
            Arc::clone(&wallets),
            Arc::clone(&principals),
            Arc::clone(&policies),
            Arc::clone(&risk),
            Arc::clone(&webhooks),
        );
        if let Some(pricer) = self.fee_pricer {
            orchestrator = orchestrator.with_fee_pricer(pricer);
        }
        if let Some(driver) = self.settlement {
            orchestrator = orchestrator.with_settlement_driver(driver);
        }

        Arc::new(Services {
            ledger,
            wallets,
            principals,
            policies,
            risk,
            webhooks,
            orchestrator: Arc::new(orchestrator),
        })
    }
}

impl Services {
    /// Builds the core with default wiring.
    pub fn new() -> Arc<Self> {
        ServicesBuilder::default().build()
    }

    pub fn builder() -> ServicesBuilder {
        ServicesBuilder::default()
    }

    // -----------------------------------------------------------------------
    // Provisioning
    // -----------------------------------------------------------------------

    /// Creates an agent with a wallet and tier-default spending policy.
    pub fn create_agent(&self, developer_id: &str, name: &str, tier: TrustTier) -> (Agent, Wallet) {
        let policy_template = SpendingPolicy::default_for_tier("", tier);
        let wallet = self.wallets.insert(Wallet::new(
            "",
            config::DEFAULT_CURRENCY,
            policy_template.limit_per_tx,
            policy_template.limit_total,
        ));
        let agent = self
            .principals
            .insert_agent(Agent::new(developer_id, name, &wallet.wallet_id));

        // Back-link the wallet to its owner and install the real policy.
        let wallet = self
            .wallets
            .update(&wallet.wallet_id, |w| w.owner_id = agent.agent_id.clone())
            .expect("wallet was just inserted");
        self.policies
            .set(SpendingPolicy::default_for_tier(&agent.agent_id, tier));

        self.webhooks.emit(Event::new(
            EventType::AgentCreated,
            json!({
                "agent_id": agent.agent_id,
                "developer_id": developer_id,
                "name": name,
                "wallet_id": wallet.wallet_id,
            }),
        ));
        self.webhooks.emit(Event::new(
            EventType::WalletCreated,
            json!({
                "wallet_id": wallet.wallet_id,
                "agent_id": agent.agent_id,
                "currency": wallet.currency,
            }),
        ));

        (agent, wallet)
    }

    /// Creates a merchant with an effectively unbounded receiving wallet
    /// and seeds its risk reputation.
    pub fn create_merchant(
        &self,
        owner_id: &str,
        name: &str,
        category: Option<&str>,
    ) -> (Merchant, Wallet) {
        let wallet = self.wallets.insert(Wallet::new(
            "",
            config::DEFAULT_CURRENCY,
            Decimal::MAX,
            Decimal::MAX,
        ));
        let merchant = self.principals.insert_merchant(Merchant::new(
            owner_id,
            name,
            &wallet.wallet_id,
            category,
        ));
        let wallet = self
            .wallets
            .update(&wallet.wallet_id, |w| {
                w.owner_id = merchant.merchant_id.clone()
            })
            .expect("wallet was just inserted");

        self.risk.merchant_reputation().register_merchant(
            &merchant.merchant_id,
            50.0,
            false,
            category.map(str::to_string).into_iter().collect(),
        );

        self.webhooks.emit(Event::new(
            EventType::WalletCreated,
            json!({
                "wallet_id": wallet.wallet_id,
                "merchant_id": merchant.merchant_id,
                "currency": wallet.currency,
            }),
        ));

        (merchant, wallet)
    }

    /// Credits external funds to a wallet through the ledger.
    pub fn fund_wallet(
        &self,
        wallet_id: &str,
        amount: Decimal,
        currency: &str,
    ) -> Result<(), LedgerError> {
        self.ledger
            .deposit(wallet_id, amount, currency, Some("External funding"))?;
        self.webhooks.emit(Event::new(
            EventType::WalletFunded,
            json!({
                "wallet_id": wallet_id,
                "amount": amount.to_string(),
                "currency": currency,
            }),
        ));
        Ok(())
    }

    /// Issues a virtual card on a wallet.
    pub fn issue_card(
        &self,
        wallet_id: &str,
        limit_per_tx: Decimal,
        limit_daily: Decimal,
    ) -> Result<VirtualCard, WalletError> {
        let wallet = self.wallets.update(wallet_id, |w| {
            w.virtual_card = Some(VirtualCard::issue(wallet_id, limit_per_tx, limit_daily));
        })?;
        Ok(wallet.virtual_card.expect("card was just attached"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn build_creates_fee_pool() {
        let services = Services::new();
        assert!(services.wallets.exists(config::FEE_POOL_WALLET_ID));
    }

    #[test]
    fn create_agent_wires_wallet_and_policy() {
        let services = Services::new();
        let (agent, wallet) = services.create_agent("dev_1", "bot", TrustTier::Medium);

        assert_eq!(wallet.owner_id, agent.agent_id);
        assert_eq!(wallet.limit_per_tx, dec!(500));
        let policy = services.policies.get(&agent.agent_id).unwrap();
        assert_eq!(policy.trust_tier, TrustTier::Medium);
    }

    #[test]
    fn create_merchant_seeds_reputation() {
        let services = Services::new();
        let (merchant, wallet) = services.create_merchant("dev_2", "shop", Some("retail"));

        assert_eq!(wallet.owner_id, merchant.merchant_id);
        let rep = services
            .risk
            .merchant_reputation()
            .reputation(&merchant.merchant_id)
            .unwrap();
        assert_eq!(rep.trust_score, 50.0);
        assert_eq!(rep.categories, vec!["retail".to_string()]);
    }

    #[test]
    fn fund_wallet_moves_ledger_balance() {
        let services = Services::new();
        let (_, wallet) = services.create_agent("dev_1", "bot", TrustTier::Low);
        services
            .fund_wallet(&wallet.wallet_id, dec!(100), "USDC")
            .unwrap();
        assert_eq!(
            services.ledger.get_balance(&wallet.wallet_id, "USDC"),
            dec!(100)
        );
    }

    #[test]
    fn issue_card_attaches_to_wallet() {
        let services = Services::new();
        let (_, wallet) = services.create_agent("dev_1", "bot", TrustTier::Low);
        let card = services
            .issue_card(&wallet.wallet_id, dec!(100), dec!(500))
            .unwrap();
        assert_eq!(card.wallet_id, wallet.wallet_id);
        assert!(services
            .wallets
            .get(&wallet.wallet_id)
            .unwrap()
            .virtual_card
            .is_some());
    }
}
