use blaze_sync::test_support::target;
use blaze_sync::{BlazeBuildParams, BlazeSyncParams, SyncMode, TargetExpression};
use proptest::prelude::*;
use std::collections::BTreeSet;

fn target_strategy() -> BoxedStrategy<TargetExpression> {
    (
        prop_oneof![Just(""), Just("-")],
        proptest::string::string_regex("[a-z]{1,6}").unwrap(),
        proptest::string::string_regex("[a-z_]{1,6}").unwrap(),
    )
        .prop_map(|(prefix, package, name)| target(&format!("{prefix}//{package}:{name}")))
        .boxed()
}

fn params_strategy() -> BoxedStrategy<BlazeSyncParams> {
    (
        proptest::sample::select(SyncMode::ALL.to_vec()),
        proptest::string::string_regex("[A-Z][a-z]{0,8}").unwrap(),
        any::<bool>(),
        any::<bool>(),
        any::<bool>(),
        proptest::collection::btree_set(target_strategy(), 0..6),
    )
        .prop_map(
            |(mode, title, background, project_view, working_set, targets)| {
                BlazeSyncParams::builder(
                    title.clone(),
                    mode,
                    BlazeBuildParams::new(format!("bazel-{title}")),
                )
                .background_sync(background)
                .add_project_view_targets(project_view)
                .add_working_set(working_set)
                .add_target_expressions(targets)
                .build()
            },
        )
        .boxed()
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        .. ProptestConfig::default()
    })]

    #[test]
    fn merged_mode_is_the_stronger_mode(a in params_strategy(), b in params_strategy()) {
        let merged = BlazeSyncParams::combine(&a, &b);
        prop_assert_eq!(merged.sync_mode(), a.sync_mode().max(b.sync_mode()));
    }

    #[test]
    fn merged_targets_are_exactly_the_union(a in params_strategy(), b in params_strategy()) {
        let merged = BlazeSyncParams::combine(&a, &b);
        let union: BTreeSet<TargetExpression> = a
            .target_expressions()
            .union(b.target_expressions())
            .cloned()
            .collect();
        prop_assert_eq!(merged.target_expressions(), &union);
    }

    #[test]
    fn merge_is_commutative_on_scope_and_flags(a in params_strategy(), b in params_strategy()) {
        let ab = BlazeSyncParams::combine(&a, &b);
        let ba = BlazeSyncParams::combine(&b, &a);
        prop_assert_eq!(ab.background_sync(), ba.background_sync());
        prop_assert_eq!(ab.target_expressions(), ba.target_expressions());
        prop_assert_eq!(ab.add_project_view_targets(), ba.add_project_view_targets());
        prop_assert_eq!(ab.add_working_set(), ba.add_working_set());
    }

    #[test]
    fn identity_follows_the_stronger_request(a in params_strategy(), b in params_strategy()) {
        let merged = BlazeSyncParams::combine(&a, &b);
        let winner = if b.sync_mode() > a.sync_mode() { &b } else { &a };
        prop_assert_eq!(merged.title(), winner.title());
        prop_assert_eq!(merged.build_params(), winner.build_params());
    }

    #[test]
    fn merging_a_request_with_itself_changes_nothing(a in params_strategy()) {
        prop_assert_eq!(BlazeSyncParams::combine(&a, &a), a);
    }
}
