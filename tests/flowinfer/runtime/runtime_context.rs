use anyhow::Result;
use flowinfer::{storage_key, ExecError, ExecutionContext, Tensor, TensorMap};

use crate::common;

#[test]
fn root_context_has_empty_id() {
    let ctx = ExecutionContext::new();
    assert_eq!(ctx.depth(), 0);
    assert_eq!(ctx.current_context_id(), "");
    assert_eq!(ctx.current_context_ids(), &[String::new()]);
    assert_eq!(ctx.frames().len(), 1);
}

#[test]
fn nested_frames_build_hierarchical_ids() -> Result<()> {
    let mut ctx = ExecutionContext::new();
    ctx.enter_frame("outer");
    ctx.enter_frame("inner");
    assert_eq!(ctx.depth(), 2);
    assert_eq!(ctx.current_context_id(), "outer-0/inner-0");
    assert_eq!(
        ctx.current_context_ids(),
        &["outer-0/inner-0".to_string(), "outer-0".to_string(), String::new()]
    );

    ctx.next_iteration()?;
    assert_eq!(ctx.current_context_id(), "outer-0/inner-1");
    ctx.exit_frame()?;
    assert_eq!(ctx.current_context_id(), "outer-0");
    ctx.next_iteration()?;
    ctx.next_iteration()?;
    assert_eq!(ctx.current_context_id(), "outer-2");
    ctx.exit_frame()?;
    assert_eq!(ctx.current_context_id(), "");
    Ok(())
}

#[test]
fn frames_get_fresh_ids() -> Result<()> {
    let mut ctx = ExecutionContext::new();
    ctx.enter_frame("loop");
    let first = ctx.frames()[1].id;
    ctx.next_iteration()?;
    let second = ctx.frames()[1].id;
    assert_ne!(first, second);
    assert_eq!(ctx.frames()[1].iteration, 1);
    Ok(())
}

#[test]
fn captured_frames_can_be_restored() -> Result<()> {
    let mut ctx = ExecutionContext::new();
    ctx.enter_frame("loop");
    let snapshot = ctx.frames().to_vec();
    ctx.next_iteration()?;
    ctx.enter_frame("nested");
    assert_eq!(ctx.current_context_id(), "loop-1/nested-0");

    ctx.set_frames(snapshot);
    assert_eq!(ctx.current_context_id(), "loop-0");
    assert_eq!(ctx.current_context_ids().len(), 2);
    Ok(())
}

#[test]
fn leaving_the_root_frame_fails() -> Result<()> {
    let mut ctx = ExecutionContext::new();
    let err = ctx.exit_frame().expect_err("nothing to exit");
    assert_eq!(
        common::exec_error(&err)?,
        &ExecError::EmptyContextStack {
            op: "Exit".to_string()
        }
    );
    let err = ctx.next_iteration().expect_err("nothing to advance");
    assert_eq!(
        common::exec_error(&err)?,
        &ExecError::EmptyContextStack {
            op: "NextIteration".to_string()
        }
    );
    assert_eq!(ctx.current_context_id(), "");
    Ok(())
}

#[test]
fn storage_keys_qualify_by_context() {
    assert_eq!(storage_key("add", ""), "add");
    assert_eq!(storage_key("add", "while-3"), "add-while-3");
    assert_eq!(storage_key("add", "a-0/b-1"), "add-a-0/b-1");
}

#[test]
fn empty_frame_stack_falls_back_to_root() {
    let mut ctx = ExecutionContext::new();
    ctx.enter_frame("outer");
    ctx.set_frames(Vec::new());
    assert_eq!(ctx.depth(), 0);
    assert_eq!(ctx.frames().len(), 1);
    assert_eq!(ctx.current_context_id(), "");
}

#[test]
fn values_resolve_in_the_nearest_enclosing_context() {
    let mut tensors = TensorMap::new();
    tensors.insert("v-outer-0".to_string(), vec![Some(Tensor::scalar_f32(1.0))]);
    tensors.insert("w".to_string(), vec![Some(Tensor::scalar_f32(2.0))]);

    let mut ctx = ExecutionContext::new();
    ctx.enter_frame("outer");
    ctx.enter_frame("inner");
    assert_eq!(tensors.context_of("v", &ctx), Some("outer-0"));
    assert_eq!(tensors.context_of("w", &ctx), Some(""));
    assert_eq!(tensors.context_of("z", &ctx), None);
    assert!(tensors.lookup("v", &ctx).is_some());
}
