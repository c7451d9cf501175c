//! Property-based tests for ledger invariants
//!
//! These tests use proptest to verify:
//! - Conservation: pool balance always matches what components account for
//! - Atomicity: rejected commands leave the state untouched
//! - Premium bounds and sticky funding
//! - Oracle resolution is independent of response arrival order
//! - The stored event chain always verifies

use proptest::prelude::*;
use rust_decimal::Decimal;
use surety_ledger::{
    state::SuretyState,
    types::Caller,
    AccountId, Command, Config, FlightKey, FlightStatusCode, Ledger, Operation, Outcome, Result,
    ScriptedIndexSource,
};

/// Stages commands against a state the way the ledger actor does
struct Harness {
    state: SuretyState,
    config: Config,
    source: ScriptedIndexSource,
}

impl Harness {
    fn new() -> Self {
        let config = Config::default();
        let (state, _) = SuretyState::genesis(&config);
        Self {
            state,
            config,
            source: ScriptedIndexSource::new([]),
        }
    }

    fn run(&mut self, account: &AccountId, value: Decimal, command: impl Into<Command>) -> Result<Outcome> {
        let caller = Caller::new(account.clone(), self.config.app_component.clone());
        let mut staged = self.state.clone();
        let applied = staged.apply(&self.config.policy, &caller, value, command.into(), &mut self.source)?;
        self.state = staged;
        Ok(applied.outcome)
    }

    /// Funded genesis airline with one registered flight
    fn with_flight() -> Self {
        let mut h = Self::new();
        h.run(&genesis(), Decimal::from(10), Operation::FundAirline).unwrap();
        h.run(&genesis(), Decimal::ZERO, Operation::RegisterFlight { flight: flight() })
            .unwrap();
        h
    }
}

fn genesis() -> AccountId {
    AccountId::new("airline-genesis")
}

fn flight() -> FlightKey {
    FlightKey::new("ND1309", 1_546_333_200_000)
}

/// Strategy for amounts in hundredths, including zero and values above every cap
fn cents_strategy() -> impl Strategy<Value = Decimal> {
    (0i64..1_500).prop_map(|cents| Decimal::new(cents, 2))
}

#[derive(Debug, Clone)]
enum Step {
    Fund(Decimal),
    Buy(usize, Decimal),
    Withdraw(usize),
}

fn step_strategy() -> impl Strategy<Value = Step> {
    prop_oneof![
        cents_strategy().prop_map(Step::Fund),
        (0usize..4, cents_strategy()).prop_map(|(p, premium)| Step::Buy(p, premium)),
        (0usize..4).prop_map(Step::Withdraw),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: A premium is accepted iff 0 < premium <= cap
    #[test]
    fn prop_premium_bounds(premium in cents_strategy()) {
        let mut h = Harness::with_flight();
        let result = h.run(
            &AccountId::new("passenger"),
            premium,
            Operation::BuyInsurance { flight: flight() },
        );

        let in_bounds = premium > Decimal::ZERO && premium <= Decimal::ONE;
        prop_assert_eq!(result.is_ok(), in_bounds);
        prop_assert!(h.state.check_conservation().is_ok());
    }

    /// Property: Funding is sticky and flips exactly at the cumulative minimum
    #[test]
    fn prop_funding_sticky(deposits in prop::collection::vec(1i64..600, 1..20)) {
        let mut h = Harness::new();
        let mut total = Decimal::ZERO;

        for cents in deposits {
            let amount = Decimal::new(cents, 2);
            h.run(&genesis(), amount, Operation::FundAirline).unwrap();
            total += amount;

            let funded = h.state.funding().is_funded(&genesis());
            prop_assert_eq!(funded, total >= Decimal::from(10));
        }

        prop_assert_eq!(h.state.pool().balance(), total);
    }

    /// Property: Rejected commands leave no trace; accepted ones conserve value
    #[test]
    fn prop_conservation(steps in prop::collection::vec(step_strategy(), 1..40)) {
        let mut h = Harness::with_flight();

        for step in steps {
            let before = h.state.clone();
            let result = match step {
                Step::Fund(amount) => h.run(&genesis(), amount, Operation::FundAirline),
                Step::Buy(p, premium) => h.run(
                    &AccountId::new(format!("passenger{}", p)),
                    premium,
                    Operation::BuyInsurance { flight: flight() },
                ),
                Step::Withdraw(p) => h.run(
                    &AccountId::new(format!("passenger{}", p)),
                    Decimal::ZERO,
                    Operation::WithdrawPayout { flight: flight() },
                ),
            };

            if result.is_err() {
                prop_assert_eq!(&h.state, &before);
            }
            prop_assert!(h.state.check_conservation().is_ok());
            prop_assert!(h.state.pool().balance() >= Decimal::ZERO);
        }
    }

    /// Property: Three late and two on-time votes resolve LateAirline in any order
    #[test]
    fn prop_response_order_irrelevant(
        votes in Just(vec![20u8, 20, 20, 10, 10]).prop_shuffle()
    ) {
        let mut h = Harness::with_flight();
        let passenger = AccountId::new("passenger");
        h.run(&passenger, Decimal::ONE, Operation::BuyInsurance { flight: flight() }).unwrap();

        for n in 0..votes.len() {
            h.source.push([1, 2, 3]);
            h.run(&AccountId::new(format!("oracle{}", n)), Decimal::ONE, Operation::RegisterOracle)
                .unwrap();
        }
        h.source.push([2]);
        h.run(&passenger, Decimal::ZERO, Operation::RequestFlightStatus { flight: flight() })
            .unwrap();

        let mut resolved = false;
        for (n, code) in votes.into_iter().enumerate() {
            let result = h.run(
                &AccountId::new(format!("oracle{}", n)),
                Decimal::ZERO,
                Operation::SubmitOracleResponse { index: 2, flight: flight(), status_code: code },
            );
            // Responses after the third late vote arrive too late
            prop_assert_eq!(result.is_err(), resolved);
            if h.state.flights().get(&flight()).and_then(|f| f.status).is_some() {
                resolved = true;
            }
        }

        let status = h.state.flights().get(&flight()).and_then(|f| f.status);
        prop_assert_eq!(status, Some(FlightStatusCode::LateAirline));
        prop_assert_eq!(h.state.policies().outstanding_credit(), Decimal::new(15, 1));
        prop_assert!(h.state.check_conservation().is_ok());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    /// Property: The stored event chain verifies after any sequence of deposits
    #[test]
    fn prop_event_chain_verifies(deposits in prop::collection::vec(1i64..2_000, 1..15)) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let temp_dir = tempfile::tempdir().unwrap();
            let mut config = Config::default();
            config.data_dir = temp_dir.path().to_path_buf();
            config.rocksdb.sync_writes = false;

            let ledger = Ledger::open(config).await.unwrap();
            for cents in &deposits {
                ledger.fund_airline(&genesis(), Decimal::new(*cents, 2)).await.unwrap();
            }

            let head = ledger.verify_event_chain().await.unwrap();
            // Genesis registration plus one event per deposit
            prop_assert_eq!(head.next_sequence, deposits.len() as u64 + 1);
            prop_assert!(ledger.check_conservation().await.is_ok());

            ledger.shutdown().await.unwrap();
            Ok(())
        })?;
    }
}
