//! Renderer parity: replaying the message sequence reproduces the
//! interpreter's output DOM.

use hvml::prelude::*;
use hvml_dom::{parse_fragment, DomId, DomTree};

/// Apply the recorded DOM-edit messages to a fresh skeleton. Both trees
/// perform identical insertion sequences, so slab ids line up.
fn replay(messages: &[RendererRequest]) -> DomTree {
    let mut tree = DomTree::new_html();
    for message in messages {
        let element = DomId(message.data["element"].as_u64().unwrap_or(0) as usize);
        let content = message.data["content"].as_str().unwrap_or("");
        match message.operation {
            Operation::AppendChild => {
                let fragment = parse_fragment(content);
                tree.graft(element, &fragment).unwrap();
            }
            Operation::DisplaceChild => {
                tree.remove_children(element).unwrap();
                let fragment = parse_fragment(content);
                tree.graft(element, &fragment).unwrap();
            }
            Operation::AppendContent => {
                tree.append_content(element, content).unwrap();
            }
            Operation::DisplaceContent => {
                tree.displace_content(element, content).unwrap();
            }
            Operation::UpdateElementProperty => {
                let property = message.data["property"].as_str().unwrap();
                let value = message.data["value"].as_str().unwrap();
                tree.set_attribute(element, property, value).unwrap();
            }
            // window management carries no DOM state
            _ => {}
        }
    }
    tree
}

#[test]
fn first_round_work_arrives_as_one_displacement() {
    let (outcome, messages) = run_document_recording(
        "<hvml><body><div id=\"x\"><p>hi</p></div><span>tail</span></body></hvml>",
    )
    .unwrap();

    let replayed = replay(&messages);
    assert_eq!(replayed.outer_html(replayed.root()), outcome.outcomes[0].html);
}

#[test]
fn event_loop_edits_replay_message_by_message() {
    let (outcome, messages) = run_document_recording(
        "<hvml>\
         <head>\
           <init as 'TIMERS'>[{\"id\": \"t\", \"interval\": 10, \"active\": \"on\"}]</init>\
         </head>\
         <body>\
           <observe on $TIMERS for \"expired:t\">\
             <span class=\"tick\">go</span>\
             <exit with 'done'/>\
           </observe>\
         </body>\
         </hvml>",
    )
    .unwrap();

    // body was empty at attach time, so everything after
    // createPlainWindow is incremental
    assert_eq!(messages[0].operation, Operation::CreatePlainWindow);
    assert!(messages.len() > 1, "expected incremental edits");

    let replayed = replay(&messages);
    assert_eq!(replayed.outer_html(replayed.root()), outcome.outcomes[0].html);
}
