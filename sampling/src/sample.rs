//  Copyright 2025 Palantir Technologies, Inc.
//
//  Licensed under the Apache License, Version 2.0 (the "License");
//  you may not use this file except in compliance with the License.
//  You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.

//! Probabilistic sampling.
use crate::settings::DICE_SCALE;

/// A source of randomness for rate based sampling decisions.
///
/// Rates are expressed out of [`DICE_SCALE`], so a rate of `1_000_000`
/// samples every trace and a rate of `0` samples none.
pub trait Dice: Sync + Send {
    /// Returns `true` if a trace should be sampled at the given rate.
    fn roll(&self, rate: u32) -> bool;
}

/// A `Dice` which always returns `true`.
pub struct AlwaysDice;

impl Dice for AlwaysDice {
    fn roll(&self, _: u32) -> bool {
        true
    }
}

/// A `Dice` which always returns `false`.
pub struct NeverDice;

impl Dice for NeverDice {
    fn roll(&self, _: u32) -> bool {
        false
    }
}

/// A `Dice` backed by the thread local random number generator.
#[derive(Default)]
pub struct RandomDice;

impl Dice for RandomDice {
    fn roll(&self, rate: u32) -> bool {
        if rate >= DICE_SCALE {
            return true;
        }
        if rate == 0 {
            return false;
        }

        rand::random::<f64>() * f64::from(DICE_SCALE) < f64::from(rate)
    }
}
