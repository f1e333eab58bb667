// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{InstanceId, ItemEvent, ItemId, RunId, TestKind};
use crate::item_set::{Keyed, SetMember};
use gotest_metadata::{Range, TestCaseRecord};
use smol_str::SmolStr;

/// A test, benchmark, fuzz target or example function, or one of its subtests.
#[derive(Clone, Debug)]
pub struct TestCase {
    instance: InstanceId,
    name: SmolStr,
    kind: TestKind,
    file_uri: SmolStr,
    origin: TestOrigin,
}

/// Where a [`TestCase`] came from.
#[derive(Clone, Debug)]
pub enum TestOrigin {
    /// Reported by the discovery service.
    Static(StaticTestCase),

    /// Synthesized while a run reported a subtest with no static counterpart.
    Dynamic(DynamicTestCase),
}

/// Data carried by a statically discovered test case.
#[derive(Clone, Debug)]
pub struct StaticTestCase {
    record: TestCaseRecord,
}

impl StaticTestCase {
    /// Returns the raw record this test was last updated from.
    pub fn record(&self) -> &TestCaseRecord {
        &self.record
    }

    /// Returns the declared source range.
    pub fn range(&self) -> Range {
        self.record.loc.range
    }

    /// Returns true if `edit` lies inside the declared range.
    ///
    /// A zero-width edit must be strictly inside: one sitting exactly on either boundary is code
    /// inserted next to the test, not into it.
    pub fn contains(&self, edit: &Range) -> bool {
        range_strictly_contains(&self.record.loc.range, edit)
    }
}

/// Data carried by a dynamically created test case.
#[derive(Copy, Clone, Debug)]
pub struct DynamicTestCase {
    run_id: RunId,
}

impl DynamicTestCase {
    /// Returns the run that created this test case.
    pub fn run_id(&self) -> RunId {
        self.run_id
    }
}

pub(crate) fn range_strictly_contains(outer: &Range, edit: &Range) -> bool {
    if edit.is_empty() {
        outer.start < edit.start && edit.end < outer.end
    } else {
        outer.start <= edit.start && edit.end <= outer.end
    }
}

impl TestCase {
    pub(crate) fn new_static(record: &TestCaseRecord, file_uri: &str) -> Self {
        Self {
            instance: InstanceId::next(),
            name: record.name.clone(),
            kind: TestKind::from_name(&record.name).unwrap_or(TestKind::Test),
            file_uri: file_uri.into(),
            origin: TestOrigin::Static(StaticTestCase {
                record: record.clone(),
            }),
        }
    }

    pub(crate) fn new_dynamic(name: SmolStr, parent: &TestCase, run_id: RunId) -> Self {
        Self {
            instance: InstanceId::next(),
            name,
            kind: parent.kind,
            file_uri: parent.file_uri.clone(),
            origin: TestOrigin::Dynamic(DynamicTestCase { run_id }),
        }
    }

    /// Returns the stable ID of this test case.
    pub fn id(&self) -> ItemId {
        ItemId::test(self.file_uri.clone(), self.kind, self.name.clone())
    }

    /// Returns the identity of this particular object.
    pub fn instance(&self) -> InstanceId {
        self.instance
    }

    /// Returns the full test name, for example `TestFoo/bar`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the last `/`-separated segment of the name.
    pub fn base_name(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }

    /// Returns the name of the parent test, if this is a subtest.
    pub fn parent_name(&self) -> Option<&str> {
        self.name.rsplit_once('/').map(|(parent, _)| parent)
    }

    /// Returns the kind of test.
    pub fn kind(&self) -> TestKind {
        self.kind
    }

    /// Returns the URI of the file this test is declared in, or for dynamic tests, the file its
    /// parent is declared in.
    pub fn file_uri(&self) -> &str {
        &self.file_uri
    }

    /// Returns where this test came from.
    pub fn origin(&self) -> &TestOrigin {
        &self.origin
    }

    /// Returns the static data, if this is a static test.
    pub fn as_static(&self) -> Option<&StaticTestCase> {
        match &self.origin {
            TestOrigin::Static(data) => Some(data),
            TestOrigin::Dynamic(_) => None,
        }
    }

    /// Returns true if this test was created during a run.
    pub fn is_dynamic(&self) -> bool {
        matches!(self.origin, TestOrigin::Dynamic(_))
    }

    /// Returns the run that created this test, if it is dynamic.
    pub fn run_id(&self) -> Option<RunId> {
        match &self.origin {
            TestOrigin::Static(_) => None,
            TestOrigin::Dynamic(data) => Some(data.run_id()),
        }
    }

    /// Returns the declared range, if this is a static test.
    pub fn range(&self) -> Option<Range> {
        self.as_static().map(StaticTestCase::range)
    }

    /// Updates a static test from a fresh record.
    ///
    /// Produces `Modified` if any of `edits` falls inside the (new) declared range, otherwise
    /// `Moved` if the record differs from the previous one, otherwise nothing. A dynamic test with
    /// the same name as a newly discovered static test becomes static.
    pub(crate) fn update_static(
        &mut self,
        record: &TestCaseRecord,
        edits: &[Range],
    ) -> Vec<ItemEvent> {
        let changed = match &self.origin {
            TestOrigin::Static(data) => data.record != *record,
            TestOrigin::Dynamic(_) => true,
        };
        let modified = edits
            .iter()
            .any(|edit| range_strictly_contains(&record.loc.range, edit));

        if changed {
            self.origin = TestOrigin::Static(StaticTestCase {
                record: record.clone(),
            });
        }

        if modified {
            vec![ItemEvent::modified(self.id())]
        } else if changed {
            vec![ItemEvent::moved(self.id())]
        } else {
            Vec::new()
        }
    }
}

impl Keyed for TestCase {
    fn key(&self) -> &str {
        &self.name
    }
}

impl Keyed for TestCaseRecord {
    fn key(&self) -> &str {
        &self.name
    }
}

impl SetMember for TestCase {
    type Event = ItemEvent;

    fn added_events(&self, events: &mut Vec<ItemEvent>) {
        events.push(ItemEvent::added(self.id()));
    }

    fn removed_events(&self, events: &mut Vec<ItemEvent>) {
        events.push(ItemEvent::removed(self.id()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ItemEventKind;
    use gotest_metadata::{Location, Position};
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn record(name: &str, start_line: u32, end_line: u32) -> TestCaseRecord {
        TestCaseRecord {
            name: name.into(),
            loc: Location {
                uri: "file:///src/foo/foo_test.go".to_owned(),
                range: Range::lines(start_line, end_line),
            },
        }
    }

    fn point(line: u32, character: u32) -> Range {
        Range::point(Position::new(line, character))
    }

    #[test_case(point(15, 0), false ; "zero width at end boundary")]
    #[test_case(point(10, 0), false ; "zero width at start boundary")]
    #[test_case(point(12, 0), true ; "zero width inside")]
    #[test_case(Range::lines(11, 13), true ; "non-empty inside")]
    #[test_case(Range::lines(10, 15), true ; "non-empty equal")]
    #[test_case(Range::lines(9, 12), false ; "overlapping start")]
    #[test_case(Range::lines(20, 21), false ; "disjoint")]
    fn containment_is_strict(edit: Range, expected: bool) {
        let test = TestCase::new_static(&record("TestFoo", 10, 15), "file:///src/foo/foo_test.go");
        let data = test.as_static().expect("static test");
        assert_eq!(data.contains(&edit), expected);
    }

    #[test]
    fn update_classifies_changes() {
        let uri = "file:///src/foo/foo_test.go";
        let mut test = TestCase::new_static(&record("TestFoo", 10, 15), uri);
        let instance = test.instance();

        assert_eq!(test.update_static(&record("TestFoo", 10, 15), &[]), vec![]);

        let events = test.update_static(&record("TestFoo", 12, 17), &[]);
        assert_eq!(
            events.iter().map(|e| e.kind).collect::<Vec<_>>(),
            vec![ItemEventKind::Moved]
        );

        let events = test.update_static(&record("TestFoo", 12, 17), &[point(13, 4)]);
        assert_eq!(
            events.iter().map(|e| e.kind).collect::<Vec<_>>(),
            vec![ItemEventKind::Modified]
        );

        // Edits just outside the range don't count.
        assert_eq!(
            test.update_static(&record("TestFoo", 12, 17), &[point(17, 0)]),
            vec![]
        );
        assert_eq!(test.instance(), instance);
        assert_eq!(test.range(), Some(Range::lines(12, 17)));
    }

    #[test]
    fn names_and_kinds() {
        let uri = "file:///src/foo/foo_test.go";
        let bench = TestCase::new_static(&record("BenchmarkFoo/size=8", 1, 3), uri);
        assert_eq!(bench.kind(), TestKind::Benchmark);
        assert_eq!(bench.base_name(), "size=8");
        assert_eq!(bench.parent_name(), Some("BenchmarkFoo"));
        assert_eq!(
            bench.id().to_string(),
            "file:///src/foo/foo_test.go?benchmark#BenchmarkFoo/size=8"
        );

        let run_id = RunId::new_v4();
        let child = TestCase::new_dynamic("BenchmarkFoo/size=8/inner".into(), &bench, run_id);
        assert!(child.is_dynamic());
        assert_eq!(child.kind(), TestKind::Benchmark);
        assert_eq!(child.file_uri(), uri);
        assert_eq!(child.run_id(), Some(run_id));
        assert_eq!(child.range(), None);
    }
}
