//! Integration tests: persistence.

use plume_story::{
    CompileContext, FormatError, SequenceKind, Story, StoryConfig, StoryContent, StoryError,
    binary,
};

fn tavern() -> StoryContent {
    let mut ctx = CompileContext::new();
    ctx.knot("tavern", |k| {
        k.global("coins", "2");
        k.tag("scene").line("The tavern is loud.");
        k.choice(|c| {
            c.entry(|e| {
                e.mixed("Order", " a drink", " an ale")
                    .condition("coins > 0")
                    .sticky()
                    .result(|r| {
                        r.logic("coins = coins - 1").divert("tavern");
                    });
            })
            .option("Leave", |r| {
                r.tunnel("street").line("Home at last.").end();
            });
        });
    });
    ctx.knot("street", |k| {
        k.sequence(SequenceKind::Cycle, |s| {
            s.text("Rain.").text("Wind.");
        })
        .line_break()
        .tunnel_return();
    });
    ctx.finish().unwrap()
}

fn transcript(mut story: Story) -> String {
    let mut out = Vec::new();
    for pick in [0, 0, 0] {
        out.push(story.continue_maximally().unwrap());
        out.extend(story.current_choices());
        if story.choose(pick).is_err() {
            break;
        }
    }
    out.push(story.continue_maximally().unwrap());
    out.join("\n")
}

#[test]
fn binary_story_plays_the_same() {
    let content = tavern();
    let bytes = binary::encode(&content).unwrap();
    let original = transcript(Story::new(content, StoryConfig::default()).unwrap());
    let decoded = transcript(Story::from_bytes(&bytes, StoryConfig::default()).unwrap());
    assert_eq!(original, decoded);
    insta::assert_snapshot!(decoded, @r"
    The tavern is loud.
    Order a drink
    Leave
    Order an ale
    The tavern is loud.
    Order a drink
    Leave
    Order an ale
    The tavern is loud.
    Leave
    Leave
    Rain.
    Home at last.
    ");
}

#[test]
fn json_story_plays_the_same() {
    let content = tavern();
    let json = content.to_json().unwrap();
    let original = transcript(Story::new(content, StoryConfig::default()).unwrap());
    let reloaded = transcript(Story::from_json(&json, StoryConfig::default()).unwrap());
    assert_eq!(original, reloaded);
}

#[test]
fn garbage_is_rejected() {
    let result = Story::from_bytes(b"nope", StoryConfig::default());
    assert!(matches!(
        result,
        Err(StoryError::Format(FormatError::BadMagic))
    ));
}
