//! Property tests for the memory, expression, and scheduling invariants.

use proptest::prelude::*;
use serde_json::json;
use std::sync::Arc;

use skein::expr::evaluate_bool;
use skein::memory::{render_value, Memory};
use skein::scheduler::Scheduler;
use skein::types::StepResult;
use skein::utils::testing::{task_step, workflow};
use skein::workflow::{Routing, RoutingKind};

/// A single dotted-path segment.
fn segment() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,6}").unwrap()
}

/// A dotted path of 1..4 segments.
fn path() -> impl Strategy<Value = String> {
    prop::collection::vec(segment(), 1..4).prop_map(|segments| segments.join("."))
}

/// Scalar JSON values as they appear in workflow memory.
fn value() -> impl Strategy<Value = serde_json::Value> {
    prop_oneof![
        any::<i64>().prop_map(|n| json!(n)),
        prop::string::string_regex("[a-zA-Z0-9 ]{0,12}")
            .unwrap()
            .prop_map(|s| json!(s)),
        any::<bool>().prop_map(|b| json!(b)),
    ]
}

/// Literal template text that contains no placeholder opener.
fn literal() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z0-9 ,.:]{0,8}").unwrap()
}

proptest! {
    /// set(P, V) into a fresh store always succeeds and get(P) returns V.
    #[test]
    fn memory_set_then_get_roundtrips(p in path(), v in value()) {
        let mem = Memory::new();
        mem.set(&p, v.clone()).unwrap();
        prop_assert_eq!(mem.get(&p).unwrap(), v);
    }

    /// Interpolation never fails, and each placeholder is replaced by the
    /// rendered value or the empty string.
    #[test]
    fn interpolation_is_total(
        parts in prop::collection::vec((literal(), segment(), any::<bool>(), value()), 0..5),
        tail in literal(),
    ) {
        let mem = Memory::new();
        let mut template = String::new();
        let mut expected = String::new();
        for (i, (lit, seg, bound, val)) in parts.iter().enumerate() {
            let p = format!("{seg}_{i}");
            template.push_str(lit);
            expected.push_str(lit);
            template.push_str(&format!("${{{p}}}"));
            if *bound {
                mem.set(&p, val.clone()).unwrap();
                expected.push_str(&render_value(val));
            }
        }
        template.push_str(&tail);
        expected.push_str(&tail);

        prop_assert_eq!(mem.resolve_interpolation(&template), expected);
    }

    /// A snapshot reflects exactly the writes committed before it.
    #[test]
    fn snapshots_are_isolated(before in value(), after in value()) {
        let mem = Memory::new();
        mem.set("a.b", before.clone()).unwrap();
        let snap = mem.snapshot();
        mem.set("a.b", after).unwrap();
        mem.set("a.c", json!("later")).unwrap();
        prop_assert_eq!(&snap["a"]["b"], &before);
        prop_assert!(snap["a"].get("c").is_none());
    }

    /// An interpolated integer equals its literal form.
    #[test]
    fn integer_expressions_roundtrip(n in 0..i64::MAX) {
        let mem = Memory::new();
        mem.set("n", json!(n)).unwrap();
        let eq_expr = format!("${{n}} == {}", n);
        let ne_expr = format!("${{n}} != {}", n);
        prop_assert!(evaluate_bool(&eq_expr, &mem).unwrap());
        prop_assert!(!evaluate_bool(&ne_expr, &mem).unwrap());
    }

    /// Interpolated comparisons agree with native integer ordering.
    #[test]
    fn integer_ordering_is_consistent(a in 0..1_000_000i64, b in 0..1_000_000i64) {
        let mem = Memory::new();
        mem.set("a", json!(a)).unwrap();
        mem.set("b", json!(b)).unwrap();
        prop_assert_eq!(evaluate_bool("${a} < ${b}", &mem).unwrap(), a < b);
        prop_assert_eq!(evaluate_bool("${a} >= ${b}", &mem).unwrap(), a >= b);
    }

    /// Identical memory and results always produce the identical cohort
    /// and routing traces.
    #[test]
    fn scheduling_is_deterministic(x in any::<i64>().prop_map(|n| n.rem_euclid(100))) {
        let mem = Memory::new();
        mem.set("x", json!(x)).unwrap();

        let mut gate = task_step("a", "echo");
        gate.next = Some(Routing {
            raw: "{...}".to_string(),
            kind: RoutingKind::Map(vec![
                ("${x} > 49".to_string(), "high".to_string()),
                ("${x} <= 49".to_string(), "low".to_string()),
            ]),
        });
        let sched = Scheduler::new(Arc::new(workflow(
            "prop",
            vec![gate, task_step("high", "echo"), task_step("low", "echo")],
        )));

        let executed = ["a".to_string()].into_iter().collect();
        let results = vec![StepResult::success("a", None, Vec::new(), 0)];

        let (cohort1, traces1) = sched.next_cohort(&mem, &executed, &results);
        let (cohort2, traces2) = sched.next_cohort(&mem, &executed, &results);

        let ids1: Vec<&str> = cohort1.iter().map(|s| s.id.as_str()).collect();
        let ids2: Vec<&str> = cohort2.iter().map(|s| s.id.as_str()).collect();
        prop_assert_eq!(&ids1, &ids2);
        prop_assert_eq!(&traces1["a"], &traces2["a"]);

        // And the decision matches the expression semantics.
        let expected = if x > 49 { "high" } else { "low" };
        prop_assert_eq!(ids1, vec![expected]);
    }
}
