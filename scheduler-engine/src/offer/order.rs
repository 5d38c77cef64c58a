// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! Offer ordering policies (spec §4.4). A composite policy applies its
//! criteria in list order, breaking ties with the next criterion.

use std::cmp::Ordering;

use scheduler_core::offer::{Offer, OrderCriterion, OrderPolicy};

fn compare_one(criterion: &OrderCriterion, a: &Offer, b: &Offer, tie_break_index: &dyn Fn(&str) -> usize) -> Ordering {
    match criterion {
        // RANDOM never produces a stable ordering key; callers shuffle the
        // pool once up front (see `OfferManager::get_offers`) and RANDOM is
        // therefore always "equal" at comparator time.
        OrderCriterion::Random => Ordering::Equal,
        OrderCriterion::Fifo => tie_break_index(&a.offer_id).cmp(&tie_break_index(&b.offer_id)),
        OrderCriterion::Cpu => a.resources.cpu_cores.partial_cmp(&b.resources.cpu_cores).unwrap_or(Ordering::Equal),
        OrderCriterion::Memory => a.resources.mem_mb.cmp(&b.resources.mem_mb),
        OrderCriterion::Disk => a.resources.disk_mb.cmp(&b.resources.disk_mb),
        OrderCriterion::RevocableFirst => Ordering::Equal, // resolved by the caller via a revocable predicate, see below
    }
}

/// Comparator for a composite order policy. `arrival_index` gives each
/// offer's FIFO position (insertion order); `RevocableFirst` reads
/// `Offer::revocable` directly.
pub fn comparator<'a>(policy: &'a OrderPolicy, arrival_index: &'a dyn Fn(&str) -> usize) -> impl Fn(&Offer, &Offer) -> Ordering + 'a {
    move |a, b| {
        for criterion in &policy.0 {
            let ord = if *criterion == OrderCriterion::RevocableFirst {
                b.revocable.cmp(&a.revocable) // revocable (true) sorts first
            } else {
                compare_one(criterion, a, b, arrival_index)
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use scheduler_core::offer::{OfferResources, PortRange};

    fn offer(id: &str, cpu: f64) -> Offer {
        Offer {
            offer_id: id.to_string(),
            agent_id: id.to_string(),
            host: format!("host-{id}"),
            resources: OfferResources {
                cpu_cores: cpu,
                mem_mb: 1024,
                disk_mb: 1024,
                port_ranges: vec![PortRange { begin: 31000, end: 31000 }],
            },
            unavailability: None,
            revocable: false,
        }
    }

    #[test]
    fn cpu_ascending_orders_by_remaining_cpu() {
        let mut offers = vec![offer("a", 8.0), offer("b", 2.0), offer("c", 4.0)];
        let arrival = |_: &str| 0usize;
        let policy = OrderPolicy::single(OrderCriterion::Cpu);
        offers.sort_by(comparator(&policy, &arrival));
        let ids: Vec<_> = offers.iter().map(|o| o.offer_id.clone()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }

    #[test]
    fn composite_breaks_ties_with_next_criterion() {
        let mut offers = vec![offer("a", 4.0), offer("b", 4.0), offer("c", 2.0)];
        let mut arrivals = std::collections::HashMap::new();
        arrivals.insert("a".to_string(), 1usize);
        arrivals.insert("b".to_string(), 0usize);
        arrivals.insert("c".to_string(), 2usize);
        let arrival = |id: &str| *arrivals.get(id).unwrap();
        let policy = OrderPolicy(vec![OrderCriterion::Cpu, OrderCriterion::Fifo]);
        offers.sort_by(comparator(&policy, &arrival));
        let ids: Vec<_> = offers.iter().map(|o| o.offer_id.clone()).collect();
        assert_eq!(ids, vec!["c", "b", "a"]);
    }

    #[test]
    fn revocable_first_sorts_revocable_offers_ahead() {
        let mut a = offer("a", 4.0);
        a.revocable = false;
        let mut b = offer("b", 4.0);
        b.revocable = true;
        let mut offers = vec![a, b];
        let arrival = |_: &str| 0usize;
        let policy = OrderPolicy::single(OrderCriterion::RevocableFirst);
        offers.sort_by(comparator(&policy, &arrival));
        let ids: Vec<_> = offers.iter().map(|o| o.offer_id.clone()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }
}
