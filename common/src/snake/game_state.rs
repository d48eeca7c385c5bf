use crate::log;
use crate::session_rng::SessionRng;
use super::settings::SnakeSettings;
use super::entity::Snake;
use super::types::{DeathReason, Direction, FieldSize, Point, TickEvent};

pub const SCORE_PER_FOOD: u32 = 1;

const RANDOM_FOOD_ATTEMPTS: usize = 100;

#[derive(Clone, Debug)]
pub struct SnakeGameState {
    pub snake: Snake,
    pub food: Option<Point>,
    pub field_size: FieldSize,
    pub high_score: u32,
}

impl SnakeGameState {
    /// Fresh round: the snake starts in the middle of the field heading right.
    pub fn new(settings: &SnakeSettings, rng: &mut SessionRng) -> Self {
        let field_size = FieldSize::new(settings.field_width, settings.field_height);
        let head = Point::new(field_size.width / 2, field_size.height / 2);
        let snake = Snake::new(head, Direction::Right, settings.effective_initial_length(), &field_size);

        let mut state = Self::with_snake(field_size, snake, None);
        state.spawn_food(rng);
        state
    }

    pub fn with_snake(field_size: FieldSize, snake: Snake, food: Option<Point>) -> Self {
        Self {
            snake,
            food,
            field_size,
            high_score: 0,
        }
    }

    /// Starts a new round with `settings`, carrying the high score over.
    pub fn restart(&self, settings: &SnakeSettings, rng: &mut SessionRng) -> Self {
        let mut state = Self::new(settings, rng);
        state.high_score = self.high_score;
        state
    }

    pub fn is_game_over(&self) -> bool {
        !self.snake.is_alive()
    }

    pub fn score(&self) -> u32 {
        self.snake.score
    }

    /// Advances the game by one tick.
    ///
    /// A `pending_direction` that reverses the current heading is ignored and
    /// the snake keeps going the way it was. Once the snake is dead this is a
    /// no-op and returns no events.
    pub fn advance(&mut self, pending_direction: Option<Direction>, rng: &mut SessionRng) -> Vec<TickEvent> {
        let mut events = Vec::new();

        if self.is_game_over() {
            return events;
        }

        if let Some(requested) = pending_direction {
            if requested.is_opposite(&self.snake.direction) {
                events.push(TickEvent::DirectionIgnored {
                    requested,
                    heading: self.snake.direction,
                });
            } else {
                self.snake.direction = requested;
            }
        }

        let next_head = match self.next_head() {
            Ok(point) => point,
            Err(reason) => {
                self.finish(reason);
                events.push(TickEvent::Died { reason });
                return events;
            }
        };

        let grows = self.food == Some(next_head);
        self.snake.push_head(next_head);
        events.push(TickEvent::Moved { head: next_head });

        if grows {
            self.snake.score += SCORE_PER_FOOD;
            events.push(TickEvent::AteFood {
                at: next_head,
                score: self.snake.score,
            });

            self.food = None;
            if let Some(food) = self.spawn_food(rng) {
                events.push(TickEvent::FoodSpawned { at: food });
            }
        } else {
            self.snake.drop_tail();
        }

        events
    }

    fn next_head(&self) -> Result<Point, DeathReason> {
        let snake = &self.snake;
        let next_head = snake
            .head()
            .step(snake.direction, &self.field_size)
            .ok_or(DeathReason::WallCollision)?;

        let grows = self.food == Some(next_head);
        let vacated_tail = !grows && next_head == snake.tail();
        if snake.occupies(&next_head) && !vacated_tail {
            return Err(DeathReason::SelfCollision);
        }

        Ok(next_head)
    }

    fn finish(&mut self, reason: DeathReason) {
        self.snake.death_reason = Some(reason);
        if self.snake.score > self.high_score {
            self.high_score = self.snake.score;
        }
        log!(
            "Snake died ({:?}) at ({}, {}) with score {}",
            reason,
            self.snake.head().x,
            self.snake.head().y,
            self.snake.score
        );
    }

    /// Places food on a free cell. Random positions are tried first; if they
    /// keep hitting the snake the free cells are scanned in order. Returns
    /// `None` only when the snake covers the whole field.
    pub fn spawn_food(&mut self, rng: &mut SessionRng) -> Option<Point> {
        let free_cells = self.field_size.cell_count().saturating_sub(self.snake.body_set.len());
        if free_cells == 0 {
            self.food = None;
            return None;
        }

        for _ in 0..RANDOM_FOOD_ATTEMPTS {
            let x = rng.random_range(0..self.field_size.width);
            let y = rng.random_range(0..self.field_size.height);
            let pos = Point::new(x, y);

            if !self.snake.occupies(&pos) {
                self.food = Some(pos);
                return self.food;
            }
        }

        self.food = (0..self.field_size.height)
            .flat_map(|y| (0..self.field_size.width).map(move |x| Point::new(x, y)))
            .find(|pos| !self.snake.occupies(pos));
        self.food
    }
}
