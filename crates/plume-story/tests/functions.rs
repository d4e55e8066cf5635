//! Integration tests: functions.

use plume_core::{List, ListItem, Value, ValueError};
use plume_expr::ExprError;
use plume_story::{
    CompileContext, NavigationError, Story, StoryConfig, StoryError, StructureError,
};

fn load(build: impl FnOnce(&mut CompileContext)) -> Story {
    let mut ctx = CompileContext::new();
    build(&mut ctx);
    Story::new(ctx.finish().unwrap(), StoryConfig::default()).unwrap()
}

#[test]
fn function_value_is_interpolated() {
    let mut story = load(|ctx| {
        ctx.function("double", &["x"], |k| {
            k.logic("return x * 2");
        });
        ctx.knot("start", |k| {
            k.global("n", "4")
                .text("Double: ")
                .interpolate("double(n)")
                .line_break()
                .end();
        });
    });
    assert_eq!(story.continue_maximally().unwrap(), "Double: 8");
}

#[test]
fn functions_nest() {
    let mut story = load(|ctx| {
        ctx.function("inc", &["x"], |k| {
            k.logic("return x + 1");
        });
        ctx.function("twice", &["x"], |k| {
            k.logic("return inc(inc(x))");
        });
        ctx.knot("start", |k| {
            k.interpolate("twice(5)").line_break().end();
        });
    });
    assert_eq!(story.continue_maximally().unwrap(), "7");
}

#[test]
fn reference_parameters_write_through() {
    let mut story = load(|ctx| {
        ctx.function("bump", &[], |k| {
            k.ref_param("x");
            k.logic("x = x + 1");
        });
        ctx.knot("start", |k| {
            k.global("n", "1")
                .logic("bump(n)")
                .logic("bump(n)")
                .text("n = ")
                .interpolate("n")
                .line_break()
                .end();
        });
    });
    assert_eq!(story.continue_maximally().unwrap(), "n = 3");
    assert_eq!(story.get_variable("n"), Some(Value::Int(3)));
}

#[test]
fn reference_parameter_needs_a_variable() {
    let mut story = load(|ctx| {
        ctx.function("bump", &[], |k| {
            k.ref_param("x");
            k.logic("x = x + 1");
        });
        ctx.knot("start", |k| {
            k.logic("bump(1)").end();
        });
    });
    assert!(matches!(
        story.continue_line(),
        Err(StoryError::Structure(StructureError::ByRefArgument { .. }))
    ));
}

#[test]
fn argument_count_is_checked() {
    let mut story = load(|ctx| {
        ctx.function("double", &["x"], |k| {
            k.logic("return x * 2");
        });
        ctx.knot("start", |k| {
            k.interpolate("double(1, 2)").end();
        });
    });
    assert!(matches!(
        story.continue_line(),
        Err(StoryError::Structure(StructureError::ArgumentCount {
            expected: 1,
            found: 2,
            ..
        }))
    ));
}

#[test]
fn functions_may_not_divert() {
    let mut story = load(|ctx| {
        ctx.function("escape", &[], |k| {
            k.divert("start");
        });
        ctx.knot("start", |k| {
            k.logic("escape()").end();
        });
    });
    assert!(matches!(
        story.continue_line(),
        Err(StoryError::Navigation(NavigationError::DivertInFunction(_)))
    ));
}

#[test]
fn return_outside_function() {
    let mut story = load(|ctx| {
        ctx.knot("start", |k| {
            k.logic("return 1").end();
        });
    });
    assert!(matches!(
        story.continue_line(),
        Err(StoryError::Structure(StructureError::ReturnOutsideFunction))
    ));
}

#[test]
fn external_functions_are_called() {
    let mut story = load(|ctx| {
        ctx.knot("start", |k| {
            k.interpolate(r#"shout("hi")"#).line_break().end();
        });
    });
    story.bind_external_function("shout", |args| {
        args.first()
            .map(|value| Value::from(value.to_string().to_uppercase()))
    });
    assert_eq!(story.continue_maximally().unwrap(), "HI");
}

#[test]
fn knot_names_read_as_visit_counts() {
    let mut story = load(|ctx| {
        ctx.knot("start", |k| {
            k.text("Visits: ").interpolate("start").line_break().end();
        });
    });
    assert_eq!(story.continue_maximally().unwrap(), "Visits: 1");
}

#[test]
fn list_globals_are_assignable() {
    let mut story = load(|ctx| {
        ctx.knot("start", |k| {
            k.list("Mood", &[("calm", 1, true), ("angry", 2, false)])
                .logic("Mood = angry")
                .text("Mood: ")
                .interpolate("Mood")
                .line_break()
                .end();
        });
    });
    assert_eq!(story.continue_maximally().unwrap(), "Mood: angry");
}

#[test]
fn host_lists_must_match_their_definition() {
    let mut story = load(|ctx| {
        ctx.knot("start", |k| {
            k.list("Mood", &[("calm", 1, true), ("angry", 2, false)])
                .end();
        });
    });
    story.continue_maximally().unwrap();
    let angry = story.variables().lists().find_item("Mood.angry").unwrap();

    story
        .set_variable("Mood", List::from_item(angry.clone()))
        .unwrap();
    assert_eq!(story.get_variable("Mood").unwrap().to_string(), "angry");

    let edited = ListItem::new("angry", 9, angry.origin);
    assert!(matches!(
        story.set_variable("Mood", List::from_item(edited)),
        Err(StoryError::Expression(ExprError::Value(
            ValueError::ItemValueMismatch { expected: 2, found: 9, .. }
        )))
    ));
    assert_eq!(story.get_variable("Mood").unwrap().to_string(), "angry");
}

#[test]
fn random_is_seeded() {
    let run = |seed| {
        let mut ctx = CompileContext::new();
        ctx.knot("start", |k| {
            k.interpolate("RANDOM(1, 1000)")
                .text(" ")
                .interpolate("RANDOM(1, 1000)")
                .line_break()
                .end();
        });
        let config = StoryConfig::default().with_seed(seed);
        let mut story = Story::new(ctx.finish().unwrap(), config).unwrap();
        story.continue_maximally().unwrap()
    };
    assert_eq!(run(7), run(7));
}

#[test]
fn temporaries_do_not_leak_across_knots() {
    let mut story = load(|ctx| {
        ctx.knot("start", |k| {
            k.logic("temp t = 5").divert("next");
        });
        ctx.knot("next", |k| {
            k.interpolate("t").end();
        });
    });
    assert_eq!(story.continue_maximally().unwrap(), "");
    assert_eq!(story.get_variable("t"), None);
}
