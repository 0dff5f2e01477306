use super::*;
use crate::position::neighborhood;
use crate::pipeline::test_utils::TestChunk;
use glam::IVec3;

#[test]
fn test_single_requires_own_position() {
  let stage = Stage::single("Chunk deflate", |chunk: Arc<TestChunk>| {
    chunk.record("deflate");
    Ok(chunk)
  });
  assert_eq!(stage.name(), "Chunk deflate");

  let pos = IVec3::new(2, -1, 5);
  let task = stage.make_task(pos);
  assert_eq!(task.name(), "Chunk deflate");
  assert_eq!(task.position(), pos);
  assert_eq!(task.requirements(), &[pos]);

  let chunk = TestChunk::new(pos);
  let out = task.apply(&[Arc::clone(&chunk)]).unwrap();
  assert!(Arc::ptr_eq(&out, &chunk));
  assert_eq!(chunk.history(), vec!["deflate"]);
}

#[test]
fn test_single_without_input_fails() {
  let stage = Stage::single("s", |chunk: Arc<TestChunk>| Ok(chunk));
  let err = stage.make_task(IVec3::ZERO).apply(&[]).unwrap_err();
  assert!(matches!(err, TaskError::Failed { .. }));
}

#[test]
fn test_inspect_passes_chunk_through() {
  let stage = Stage::inspect("Chunk ready", |chunk: &TestChunk| chunk.record("ready"));
  let chunk = TestChunk::new(IVec3::ZERO);

  let out = stage.make_task(IVec3::ZERO).apply(&[Arc::clone(&chunk)]).unwrap();
  assert!(Arc::ptr_eq(&out, &chunk));
  assert_eq!(chunk.history(), vec!["ready"]);
}

#[test]
fn test_multi_receives_chunks_in_requirement_order() {
  let stage = Stage::multi(
    "Light merging",
    |chunks: &[Arc<TestChunk>]| {
      let order: Vec<String> = chunks.iter().map(|c| c.position().to_string()).collect();
      let center = Arc::clone(&chunks[chunks.len() / 2]);
      center.record(&order.join(" "));
      Ok(center)
    },
    |pos| neighborhood(pos, 1),
  );

  let center = IVec3::new(4, 4, 4);
  let task = stage.make_task(center);
  assert_eq!(task.requirements().len(), 27);
  assert_eq!(task.requirements()[13], center);

  let chunks: Vec<_> = task
    .requirements()
    .iter()
    .map(|&p| TestChunk::new(p))
    .collect();
  let out = task.apply(&chunks).unwrap();
  assert_eq!(out.position(), center);

  let expected: Vec<String> = task.requirements().iter().map(|p| p.to_string()).collect();
  assert_eq!(out.history(), vec![expected.join(" ")]);
}

/// Every call builds a fresh task; stages are never shared across positions.
#[test]
fn test_make_task_is_per_position() {
  let stage = Stage::single("s", |chunk: Arc<TestChunk>| Ok(chunk));
  let a = stage.make_task(IVec3::X);
  let b = stage.make_task(IVec3::Y);
  assert_eq!(a.requirements(), &[IVec3::X]);
  assert_eq!(b.requirements(), &[IVec3::Y]);
}

#[test]
fn test_generator_has_no_requirements() {
  let pos = IVec3::new(1, 1, 1);
  let task = ChunkTask::generator(pos, move || Ok(TestChunk::new(pos)));
  assert_eq!(task.name(), GENERATION_STAGE_NAME);
  assert!(task.requirements().is_empty());
  assert_eq!(task.apply(&[]).unwrap().position(), pos);
}

#[test]
fn test_bind_runs_with_bound_inputs() {
  let stage = Stage::single("s", |chunk: Arc<TestChunk>| {
    chunk.record("bound");
    Ok(chunk)
  });
  let chunk = TestChunk::new(IVec3::ZERO);
  let work = stage.make_task(IVec3::ZERO).bind(vec![Arc::clone(&chunk)]);

  let out = std::thread::spawn(work).join().unwrap().unwrap();
  assert!(Arc::ptr_eq(&out, &chunk));
  assert_eq!(chunk.history(), vec!["bound"]);
}
