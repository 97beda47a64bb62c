use crate::config::AllocationPolicy;
use crate::decimal::Money;
use crate::errors::{LedgerError, Result};
use crate::types::Allocation;

use super::PaymentContext;

/// component of an outstanding balance a payment can be applied to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceComponent {
    Principal,
    Interest,
    Fees,
}

/// order in which an unallocated payment is applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentWaterfall {
    order: [BalanceComponent; 3],
}

impl PaymentWaterfall {
    /// interest due -> fees -> principal
    pub fn interest_first() -> Self {
        Self {
            order: [
                BalanceComponent::Interest,
                BalanceComponent::Fees,
                BalanceComponent::Principal,
            ],
        }
    }

    /// fees -> interest -> principal
    pub fn fees_first() -> Self {
        Self {
            order: [
                BalanceComponent::Fees,
                BalanceComponent::Interest,
                BalanceComponent::Principal,
            ],
        }
    }

    /// principal -> interest -> fees
    pub fn principal_first() -> Self {
        Self {
            order: [
                BalanceComponent::Principal,
                BalanceComponent::Interest,
                BalanceComponent::Fees,
            ],
        }
    }

    pub fn for_policy(policy: AllocationPolicy) -> Self {
        match policy {
            AllocationPolicy::InterestFirst => Self::interest_first(),
            AllocationPolicy::FeesFirst => Self::fees_first(),
            AllocationPolicy::PrincipalFirst => Self::principal_first(),
        }
    }

    pub fn order(&self) -> &[BalanceComponent] {
        &self.order
    }
}

/// splits payments across principal, interest and fees
#[derive(Debug, Clone)]
pub struct PaymentAllocator {
    waterfall: PaymentWaterfall,
}

impl PaymentAllocator {
    pub fn new(waterfall: PaymentWaterfall) -> Self {
        Self { waterfall }
    }

    pub fn for_policy(policy: AllocationPolicy) -> Self {
        Self::new(PaymentWaterfall::for_policy(policy))
    }

    /// allocate `amount` against what is due; overpayments are rejected
    pub fn allocate(
        &self,
        amount: Money,
        explicit: Option<Allocation>,
        context: &PaymentContext,
    ) -> Result<Allocation> {
        context.validate_payment(amount)?;

        match explicit {
            Some(allocation) => {
                Self::validate_explicit(amount, &allocation, context)?;
                Ok(allocation)
            }
            None => Ok(self.apply_waterfall(amount, context)),
        }
    }

    fn validate_explicit(amount: Money, allocation: &Allocation, context: &PaymentContext) -> Result<()> {
        if allocation.has_negative_component() {
            return Err(LedgerError::validation(
                "allocation components must not be negative",
            ));
        }
        let largest = allocation.principal.max(allocation.interest).max(allocation.fees);
        if largest > amount {
            return Err(LedgerError::validation(format!(
                "allocation component {} exceeds payment amount {}",
                largest, amount
            )));
        }
        if allocation.total() != amount {
            return Err(LedgerError::validation(format!(
                "allocation {} + {} + {} does not equal payment amount {}",
                allocation.principal, allocation.interest, allocation.fees, amount
            )));
        }
        if allocation.principal > context.principal {
            return Err(LedgerError::validation(format!(
                "principal portion {} exceeds outstanding principal {}",
                allocation.principal, context.principal
            )));
        }
        Ok(())
    }

    fn apply_waterfall(&self, amount: Money, context: &PaymentContext) -> Allocation {
        let mut remaining = amount;
        let mut allocation = Allocation::default();

        for component in self.waterfall.order() {
            if remaining.is_zero() {
                break;
            }
            let applied = remaining.min(context.due(*component));
            match component {
                BalanceComponent::Principal => allocation.principal = applied,
                BalanceComponent::Interest => allocation.interest = applied,
                BalanceComponent::Fees => allocation.fees = applied,
            }
            remaining -= applied;
        }

        allocation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> PaymentContext {
        PaymentContext {
            principal: Money::from_major(10_000),
            interest: Money::from_major(300),
            fees: Money::from_major(50),
        }
    }

    #[test]
    fn test_interest_first_waterfall() {
        let allocator = PaymentAllocator::for_policy(AllocationPolicy::InterestFirst);

        let small = allocator.allocate(Money::from_major(200), None, &context()).unwrap();
        assert_eq!(small, Allocation::split(Money::ZERO, Money::from_major(200)));

        let larger = allocator.allocate(Money::from_major(1_000), None, &context()).unwrap();
        assert_eq!(larger.interest, Money::from_major(300));
        assert_eq!(larger.fees, Money::from_major(50));
        assert_eq!(larger.principal, Money::from_major(650));
        assert_eq!(larger.total(), Money::from_major(1_000));
    }

    #[test]
    fn test_fees_and_principal_first() {
        let fees_first = PaymentAllocator::for_policy(AllocationPolicy::FeesFirst)
            .allocate(Money::from_major(100), None, &context())
            .unwrap();
        assert_eq!(fees_first, Allocation::new(Money::ZERO, Money::from_major(50), Money::from_major(50)));

        let principal_first = PaymentAllocator::for_policy(AllocationPolicy::PrincipalFirst)
            .allocate(Money::from_major(10_100), None, &context())
            .unwrap();
        assert_eq!(principal_first.principal, Money::from_major(10_000));
        assert_eq!(principal_first.interest, Money::from_major(100));
        assert_eq!(principal_first.fees, Money::ZERO);
    }

    #[test]
    fn test_full_payoff_and_overpayment() {
        let allocator = PaymentAllocator::for_policy(AllocationPolicy::InterestFirst);

        let payoff = allocator.allocate(Money::from_major(10_350), None, &context()).unwrap();
        assert_eq!(payoff, Allocation::new(Money::from_major(10_000), Money::from_major(300), Money::from_major(50)));

        let over = allocator.allocate(Money::from_major(10_351), None, &context());
        assert!(matches!(over, Err(LedgerError::Overpayment { .. })));
    }

    #[test]
    fn test_explicit_allocation_must_sum() {
        let allocator = PaymentAllocator::for_policy(AllocationPolicy::InterestFirst);

        let split = Allocation::split(Money::from_major(400), Money::from_major(100));
        assert_eq!(
            allocator.allocate(Money::from_major(500), Some(split), &context()).unwrap(),
            split
        );

        let short = allocator.allocate(Money::from_major(600), Some(split), &context());
        assert!(matches!(short, Err(LedgerError::Validation { .. })));

        let negative = Allocation::split(Money::from_major(600), Money::from_major(-100));
        assert!(allocator.allocate(Money::from_major(500), Some(negative), &context()).is_err());
    }

    #[test]
    fn test_explicit_component_larger_than_payment() {
        let allocator = PaymentAllocator::for_policy(AllocationPolicy::InterestFirst);
        let huge = Money::from_decimal(rust_decimal::Decimal::MAX);

        let oversized = Allocation::new(huge, huge, huge);
        assert!(matches!(
            allocator.allocate(Money::from_major(500), Some(oversized), &context()),
            Err(LedgerError::Validation { .. })
        ));

        let lopsided = Allocation::new(Money::ZERO, Money::from_major(501), Money::ZERO);
        assert!(matches!(
            allocator.allocate(Money::from_major(500), Some(lopsided), &context()),
            Err(LedgerError::Validation { .. })
        ));
    }

    #[test]
    fn test_explicit_principal_capped_at_outstanding() {
        let allocator = PaymentAllocator::for_policy(AllocationPolicy::InterestFirst);
        let ctx = PaymentContext {
            principal: Money::from_major(100),
            interest: Money::from_major(300),
            fees: Money::ZERO,
        };

        let split = Allocation::split(Money::from_major(150), Money::from_major(50));
        assert!(matches!(
            allocator.allocate(Money::from_major(200), Some(split), &ctx),
            Err(LedgerError::Validation { .. })
        ));
    }
}
