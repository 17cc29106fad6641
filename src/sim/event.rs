/// Events emitted during an exploration step.
/// The shell consumes these for screen switches and logging.

use crate::domain::entity::EnemyId;

#[derive(Clone, Debug, PartialEq)]
pub enum GameEvent {
    /// Hero touched a demon; the battle snapshot has been written.
    EncounterStarted { enemy: EnemyId },
    /// Transition finished; switch to the battle screen now.
    EnterBattle { enemy: EnemyId },
    /// Hero is standing on an exit that is still sealed.
    ExitSealed,
    LevelCompleted,
}
