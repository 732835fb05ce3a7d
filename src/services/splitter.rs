use rand::Rng;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Source of uniform draws in `[0, upper)`
pub trait DrawSource {
    fn draw_below(&mut self, upper: u64) -> u64;
}

/// Adapts any `rand` generator into a draw source
pub struct RandomDraws<R>(pub R);

impl<R: Rng> DrawSource for RandomDraws<R> {
    fn draw_below(&mut self, upper: u64) -> u64 {
        if upper == 0 {
            return 0;
        }
        self.0.gen_range(0..upper)
    }
}

/// Splits a balance into randomized, fee-reserving parts
#[derive(Debug, Clone)]
pub struct AmountSplitter {
    min_amount: Decimal,
    fee: Decimal,
}

impl AmountSplitter {
    pub fn new(min_amount: Decimal, fee: Decimal) -> Self {
        Self { min_amount, fee }
    }

    /// Partition `balance` into at most `part_count` amounts.
    ///
    /// Each step draws a whole number of cents below the remaining balance,
    /// truncates it to its leading digit (734 -> 700) and takes it as a part;
    /// zero draws are skipped but still consume a part. The last part is what
    /// remains minus one fee for every part produced. An empty result means
    /// migration is not possible.
    pub fn split<D: DrawSource + ?Sized>(
        &self,
        balance: Decimal,
        part_count: usize,
        draws: &mut D,
    ) -> Vec<Decimal> {
        if balance < self.min_amount || part_count == 0 {
            return Vec::new();
        }

        let cent = Decimal::new(1, 2);
        let mut parts = Vec::new();
        let mut remaining = balance;
        let mut parts_left = part_count;

        while parts_left > 1 && remaining >= cent {
            let ceiling = (remaining * Decimal::ONE_HUNDRED)
                .floor()
                .to_u64()
                .unwrap_or(0);
            // Under two cents every draw is zero; the rest would only burn parts
            if ceiling < 2 {
                break;
            }
            let cents = leading_digit_bucket(draws.draw_below(ceiling));
            let candidate = Decimal::from(cents) / Decimal::ONE_HUNDRED;

            if candidate > Decimal::ZERO {
                parts.push(candidate);
            }
            remaining -= candidate;
            parts_left -= 1;
        }

        let last = remaining - self.fee * Decimal::from(parts.len() + 1);
        if last <= Decimal::ZERO {
            tracing::debug!(
                "Balance {} cannot cover fees for {} parts",
                balance,
                parts.len() + 1
            );
            return Vec::new();
        }
        parts.push(last);

        parts
    }
}

/// Round down to the leading digit: 734 -> 700, 19 -> 10, 7 -> 7
fn leading_digit_bucket(value: u64) -> u64 {
    let mut bucket = 1u64;
    while bucket <= value / 10 {
        bucket *= 10;
    }
    value / bucket * bucket
}
