//! Greedy autopilot: head for the food, never into a wall or the body

use snake_core::{Direction, GameSnapshot, Position};

/// Next direction to request, or `None` to keep going straight
pub fn choose_direction(snapshot: &GameSnapshot, grid_size: i32) -> Option<Direction> {
    let head = *snapshot.snake.first()?;
    let current = snapshot.direction;

    let best = Direction::ALL
        .into_iter()
        .filter(|d| *d != current.opposite())
        .filter(|d| is_safe(&snapshot.snake, head.step(*d), grid_size))
        .min_by_key(|d| (distance(head.step(*d), snapshot.food), *d != current))?;

    (best != current).then_some(best)
}

/// The tail cell is free next tick unless the snake grows, which this
/// ignores
fn is_safe(snake: &[Position], cell: Position, grid_size: i32) -> bool {
    cell.in_bounds(grid_size) && !snake[..snake.len() - 1].contains(&cell)
}

fn distance(a: Position, b: Position) -> i32 {
    (a.x - b.x).abs() + (a.y - b.y).abs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use snake_core::GamePhase;

    fn snapshot(snake: &[(i32, i32)], food: (i32, i32), direction: Direction) -> GameSnapshot {
        GameSnapshot {
            snake: snake.iter().map(|&(x, y)| Position::new(x, y)).collect(),
            food: Position::new(food.0, food.1),
            direction,
            score: 0,
            phase: GamePhase::Playing,
            session_id: None,
            time_left: 60,
            move_count: 0,
            tx_pending: false,
            feed: Vec::new(),
        }
    }

    #[test]
    fn test_keeps_going_toward_food() {
        let s = snapshot(&[(15, 15), (14, 15), (13, 15)], (22, 15), Direction::Right);
        assert_eq!(choose_direction(&s, 30), None);
    }

    #[test]
    fn test_turns_toward_food() {
        let s = snapshot(&[(15, 15), (14, 15), (13, 15)], (15, 5), Direction::Right);
        assert_eq!(choose_direction(&s, 30), Some(Direction::Up));
    }

    #[test]
    fn test_never_reverses() {
        let s = snapshot(&[(15, 15), (14, 15), (13, 15)], (2, 15), Direction::Right);
        let choice = choose_direction(&s, 30);
        assert_ne!(choice, Some(Direction::Left));
        assert!(choice.is_some());
    }

    #[test]
    fn test_avoids_wall() {
        let s = snapshot(&[(29, 10), (28, 10)], (29, 20), Direction::Right);
        assert_eq!(choose_direction(&s, 30), Some(Direction::Down));
    }

    #[test]
    fn test_avoids_body() {
        // Food straight down, but the body is there
        let s = snapshot(
            &[(5, 5), (6, 5), (6, 6), (5, 6), (4, 6), (4, 7)],
            (5, 9),
            Direction::Left,
        );
        assert_ne!(choose_direction(&s, 30), Some(Direction::Down));
    }
}
