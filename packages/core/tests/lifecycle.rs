//! Full-document runs through the heap: frame lifecycles, scoped
//! bindings, and the control tags.

use hvml_core::prelude::*;
use std::rc::Rc;

fn heap() -> Heap {
    Heap::new(RendererLink::new(Box::new(RecordingTransport::new())))
}

fn run(source: &str) -> CoroutineOutcome {
    let mut heap = heap();
    heap.schedule_document(Rc::new(parse_document(source).unwrap()))
        .unwrap();
    let mut outcome = heap.run();
    assert_eq!(outcome.outcomes.len(), 1);
    outcome.outcomes.remove(0)
}

#[test]
fn nested_foreign_elements_build_the_output_tree() {
    let outcome = run("<hvml><body><div class=\"wrap\"><p>hello</p></div></body></hvml>");
    assert!(outcome.exception.is_none());
    assert_eq!(
        outcome.html,
        "<html><head></head><body><div class=\"wrap\"><p>hello</p></div></body></html>"
    );
}

#[test]
fn init_binding_is_visible_to_following_siblings() {
    let outcome = run(
        "<hvml><body><init as 'greeting' with 'hello'/><div><span>$greeting</span></div></body></hvml>",
    );
    assert!(outcome.exception.is_none());
    assert!(outcome.html.contains("<span>hello</span>"), "{}", outcome.html);
}

#[test]
fn init_under_head_binds_at_document_level() {
    let outcome = run(
        "<hvml><head><init as 'title' with 'doc-wide'/></head><body><span>$title</span></body></hvml>",
    );
    assert!(outcome.exception.is_none());
    assert!(outcome.html.contains("<span>doc-wide</span>"), "{}", outcome.html);
}

#[test]
fn init_content_parses_as_data() {
    let outcome = run(
        "<hvml><body><init as 'nums'>[10, 20, 30]</init><iterate on $nums><i>$<</i></iterate></body></hvml>",
    );
    assert!(outcome.exception.is_none());
    assert!(
        outcome.html.contains("<i>10</i><i>20</i><i>30</i>"),
        "{}",
        outcome.html
    );
}

#[test]
fn test_match_selects_the_matching_arm() {
    let outcome = run(
        "<hvml><body><init as 'x' with 2/><test on $x>\
         <match for \"MATCH: EQ 1\"><span>one</span></match>\
         <match for \"MATCH: EQ 2\"><span>two</span></match>\
         </test></body></hvml>",
    );
    assert!(outcome.exception.is_none());
    assert!(outcome.html.contains("<span>two</span>"), "{}", outcome.html);
    assert!(!outcome.html.contains("<span>one</span>"), "{}", outcome.html);
}

#[test]
fn exclusive_test_runs_only_the_first_matching_arm() {
    let outcome = run(
        "<hvml><body><test on 5 exclusively>\
         <match for \"MATCH: GT 1\"><span>a</span></match>\
         <match for \"MATCH: GT 2\"><span>b</span></match>\
         </test></body></hvml>",
    );
    assert!(outcome.html.contains("<span>a</span>"), "{}", outcome.html);
    assert!(!outcome.html.contains("<span>b</span>"), "{}", outcome.html);
}

#[test]
fn choose_with_filter_narrows_the_input() {
    let outcome = run(
        "<hvml><body><init as 'nums'>[1, 5, 9, 12]</init>\
         <choose on $nums by \"FILTER: GE 9\"><iterate on $?><b>$<</b></iterate></choose>\
         </body></hvml>",
    );
    assert!(outcome.exception.is_none());
    assert!(outcome.html.contains("<b>9</b><b>12</b>"), "{}", outcome.html);
}

#[test]
fn sort_orders_members() {
    let outcome = run(
        "<hvml><body><init as 'nums'>[3, 1, 2]</init>\
         <sort on $nums descendingly><iterate on $?><i>$<</i></iterate></sort>\
         </body></hvml>",
    );
    assert!(outcome.html.contains("<i>3</i><i>2</i><i>1</i>"), "{}", outcome.html);
}

#[test]
fn differ_runs_children_only_on_difference() {
    let outcome = run(
        "<hvml><body>\
         <differ on 1 with 2><span>differs</span></differ>\
         <differ on 3 with 3><span>same</span></differ>\
         </body></hvml>",
    );
    assert!(outcome.html.contains("differs"), "{}", outcome.html);
    assert!(!outcome.html.contains("same"), "{}", outcome.html);
}

#[test]
fn define_and_include_execute_the_group() {
    let outcome = run(
        "<hvml><body>\
         <define as 'chip'><span>chip</span></define>\
         <include from 'chip'/><include from 'chip'/>\
         </body></hvml>",
    );
    assert!(outcome.exception.is_none());
    assert_eq!(outcome.html.matches("<span>chip</span>").count(), 2, "{}", outcome.html);
}

#[test]
fn call_returns_through_back() {
    let outcome = run(
        "<hvml><body>\
         <define as 'answer'><back with 42/></define>\
         <call from 'answer'/><span>$?</span>\
         </body></hvml>",
    );
    // <back> delivers 42 as the call's result, which lands in the
    // enclosing frame's `?`
    assert!(outcome.exception.is_none());
    assert!(outcome.html.contains("<span>42</span>"), "{}", outcome.html);
}

#[test]
fn update_sets_attributes_on_dom_targets() {
    let outcome = run(
        "<hvml><body><div id=\"box\">x</div>\
         <update on \"#box\" at 'attr.class' with 'active'/>\
         </body></hvml>",
    );
    assert!(outcome.exception.is_none());
    assert!(
        outcome.html.contains("class=\"active\""),
        "{}",
        outcome.html
    );
}

#[test]
fn update_displaces_content() {
    let outcome = run(
        "<hvml><body><div id=\"box\">old</div>\
         <update on \"#box\" with 'new'/>\
         </body></hvml>",
    );
    assert!(outcome.html.contains("<div id=\"box\">new</div>"), "{}", outcome.html);
}

#[test]
fn undefined_variable_raises_unless_silent() {
    let outcome = run("<hvml><body><span>$missing</span></body></hvml>");
    let exception = outcome.exception.expect("should have captured BadName");
    assert_eq!(exception.atom().as_str(), "BadName");

    let outcome = run("<hvml><body><span silently>$missing</span></body></hvml>");
    assert!(outcome.exception.is_none());
}

#[test]
fn preemptor_overrides_exactly_one_transition() {
    use std::cell::Cell;

    let mut heap = heap();
    let id = heap
        .schedule_document(Rc::new(
            parse_document("<hvml><body><span>x</span></body></hvml>").unwrap(),
        ))
        .unwrap();

    let fired = Rc::new(Cell::new(0));
    let fired2 = fired.clone();
    {
        let co = heap.coroutines.get_mut(id.0).unwrap();
        co.stack[0].preemptor = Some(Box::new(move |_ctx| {
            fired2.set(fired2.get() + 1);
            Ok(())
        }));
    }

    // the first tick runs the preemptor instead of the phase dispatcher,
    // then it is gone and the document still completes normally
    heap.tick();
    assert_eq!(fired.get(), 1);
    heap.pump();

    assert_eq!(fired.get(), 1);
    let outcomes = heap.take_outcomes();
    assert!(outcomes[0].html.contains("<span>x</span>"));
}

#[test]
fn iterate_counter_reaches_the_item_count() {
    let outcome = run("<hvml><body><iterate on 3L><span>$%</span></iterate></body></hvml>");
    assert!(outcome.exception.is_none());
    assert!(
        outcome
            .html
            .contains("<span>0</span><span>1</span><span>2</span>"),
        "{}",
        outcome.html
    );
}
