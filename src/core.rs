/**
Detached background workers.

Workers own everything they need and report their outcome through logging
and hooks only; nobody awaits them.
*/
pub(crate) trait Spawn {
	fn spawn(self);
}
