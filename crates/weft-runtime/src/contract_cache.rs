//! Contract memoization and the reverse dependency index
//!
//! Contracts are pure functions of static type shape, so they are built
//! once per concrete type and shared for the process lifetime — including
//! across engines (`Rc<ContractCache>` is cheap to share, and the cache is
//! effectively immutable after each type's first build). The reverse index
//! (service type → concrete types requiring it) is populated as a byproduct
//! of construction and is what makes propagation incremental: a presence
//! flip re-checks exactly the types that care, never the whole world.

use std::any::TypeId;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use tracing::debug;
use weft_domain::{Component, Contract, ServiceTypeId};

/// Process-wide contract store with a reverse dependency index
pub struct ContractCache {
    contracts: RefCell<HashMap<TypeId, Rc<Contract>>>,
    dependents: RefCell<HashMap<ServiceTypeId, Vec<TypeId>>>,
}

impl ContractCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self {
            contracts: RefCell::new(HashMap::new()),
            dependents: RefCell::new(HashMap::new()),
        }
    }

    /// Fetch the contract for `C`, building and indexing it on first use
    pub fn get<C: Component>(&self) -> Rc<Contract> {
        if let Some(contract) = self.contracts.borrow().get(&TypeId::of::<C>()).cloned() {
            return contract;
        }

        let contract = Rc::new(Contract::build::<C>());
        debug!(
            component = contract.type_name(),
            required = contract.required().len(),
            provided = contract.provided().len(),
            inert = contract.is_inert(),
            "contract built"
        );

        self.contracts
            .borrow_mut()
            .insert(contract.type_id(), Rc::clone(&contract));
        let mut dependents = self.dependents.borrow_mut();
        for required in contract.required() {
            dependents
                .entry(*required)
                .or_default()
                .push(contract.type_id());
        }
        contract
    }

    /// Fetch an already-built contract by type identity
    pub fn get_by_id(&self, type_id: TypeId) -> Option<Rc<Contract>> {
        self.contracts.borrow().get(&type_id).cloned()
    }

    /// Concrete types whose contracts require the given service type
    pub fn dependents_of(&self, service: ServiceTypeId) -> Vec<TypeId> {
        self.dependents
            .borrow()
            .get(&service)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of contracts built so far
    pub fn contract_count(&self) -> usize {
        self.contracts.borrow().len()
    }
}

impl Default for ContractCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;
    use weft_domain::ContractBuilder;

    struct Provider;

    impl Component for Provider {
        fn contract(builder: &mut ContractBuilder<Self>) {
            builder.provides::<Provider>(|me| me);
        }
    }

    struct Consumer;

    impl Component for Consumer {
        fn contract(builder: &mut ContractBuilder<Self>) {
            builder.on_activate::<Rc<Provider>, _>(|_me, _provider| Ok(()));
        }
    }

    #[test]
    fn contracts_are_memoized() {
        let cache = ContractCache::new();
        let first = cache.get::<Provider>();
        let second = cache.get::<Provider>();
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(cache.contract_count(), 1);
    }

    #[test]
    fn reverse_index_tracks_dependents() {
        let cache = ContractCache::new();
        cache.get::<Provider>();
        assert!(cache.dependents_of(ServiceTypeId::of::<Provider>()).is_empty());

        let consumer = cache.get::<Consumer>();
        let dependents = cache.dependents_of(ServiceTypeId::of::<Provider>());
        assert_eq!(dependents, vec![consumer.type_id()]);
    }

    #[test]
    fn get_by_id_only_returns_built_contracts() {
        let cache = ContractCache::new();
        assert!(cache.get_by_id(TypeId::of::<Provider>()).is_none());
        cache.get::<Provider>();
        assert!(cache.get_by_id(TypeId::of::<Provider>()).is_some());
    }
}
