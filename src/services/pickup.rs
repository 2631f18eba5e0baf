use rand::Rng;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter};
use tracing::warn;

use crate::{
    entities::order::{self, OrderStatus},
    errors::ServiceError,
};

/// Uppercase letters and digits minus the look-alikes 0/O and 1/I.
const PICKUP_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

const MAX_ATTEMPTS: usize = 32;

pub fn generate_pickup_code(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len.max(1))
        .map(|_| PICKUP_ALPHABET[rng.gen_range(0..PICKUP_ALPHABET.len())] as char)
        .collect()
}

pub fn normalize_pickup_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Compares the code typed at the counter against the one issued with the order.
pub fn pickup_code_matches(expected: &str, entered: &str) -> bool {
    let entered = normalize_pickup_code(entered);
    !entered.is_empty() && normalize_pickup_code(expected) == entered
}

/// Draws codes until one is not held by any open order.
pub async fn unique_pickup_code<C>(db: &C, len: usize) -> Result<String, ServiceError>
where
    C: ConnectionTrait,
{
    for _ in 0..MAX_ATTEMPTS {
        let code = generate_pickup_code(len);
        let taken = order::Entity::find()
            .filter(order::Column::PickupCode.eq(code.clone()))
            .filter(order::Column::Status.is_not_in([OrderStatus::Completed, OrderStatus::Cancelled]))
            .count(db)
            .await?;
        if taken == 0 {
            return Ok(code);
        }
        warn!(code = %code, "pickup code collision, drawing again");
    }

    Err(ServiceError::InternalError(
        "Could not allocate a unique pickup code".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn generated_codes_avoid_ambiguous_glyphs() {
        for _ in 0..200 {
            let code = generate_pickup_code(6);
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| PICKUP_ALPHABET.contains(&(c as u8))));
            assert!(!code.contains(['0', 'O', '1', 'I']));
        }
    }

    #[test]
    fn blank_input_never_matches() {
        assert!(!pickup_code_matches("ABC234", "   "));
        assert!(!pickup_code_matches("ABC234", "ABC235"));
    }

    proptest! {
        #[test]
        fn matching_ignores_case_and_surrounding_whitespace(
            code in "[A-HJ-NP-Z2-9]{4,8}",
            left in "[ \t]{0,3}",
            right in "[ \t\n]{0,3}",
            lower in any::<bool>(),
        ) {
            let typed = if lower { code.to_lowercase() } else { code.clone() };
            let entered = format!("{}{}{}", left, typed, right);
            prop_assert!(pickup_code_matches(&code, &entered));
        }
    }
}
