use std::collections::{HashSet, VecDeque};

use serde::Serialize;

use super::types::{DeathReason, Direction, FieldSize, Point};

#[derive(Clone, Debug)]
pub struct Snake {
    pub body: VecDeque<Point>,
    pub body_set: HashSet<Point>,
    pub direction: Direction,
    pub death_reason: Option<DeathReason>,
    pub score: u32,
}

impl Snake {
    /// Lays the body out behind `head`, away from `direction`. Segments that
    /// would fall outside the field are not created.
    pub fn new(head: Point, direction: Direction, length: usize, field_size: &FieldSize) -> Self {
        let mut body = Vec::with_capacity(length);
        body.push(head);

        let behind = direction.opposite();
        let mut current = head;
        while body.len() < length {
            match current.step(behind, field_size) {
                Some(next) => {
                    body.push(next);
                    current = next;
                }
                None => break,
            }
        }

        Self::from_body(body, direction)
    }

    /// Builds a snake from explicit segments, head first.
    pub fn from_body(segments: Vec<Point>, direction: Direction) -> Self {
        let body: VecDeque<Point> = segments.into_iter().collect();
        let body_set = body.iter().copied().collect();

        Self {
            body,
            body_set,
            direction,
            death_reason: None,
            score: 0,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.death_reason.is_none()
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    pub fn head(&self) -> Point {
        *self.body.front().expect("Snake body should never be empty")
    }

    pub fn tail(&self) -> Point {
        *self.body.back().expect("Snake body should never be empty")
    }

    pub fn occupies(&self, point: &Point) -> bool {
        self.body_set.contains(point)
    }

    pub(super) fn push_head(&mut self, head: Point) {
        self.body.push_front(head);
        self.body_set.insert(head);
    }

    pub(super) fn drop_tail(&mut self) {
        if let Some(tail) = self.body.pop_back() {
            if !self.body.contains(&tail) {
                self.body_set.remove(&tail);
            }
        }
    }

    pub fn to_view(&self) -> SnakeView {
        SnakeView {
            body: self.body.iter().copied().collect(),
            direction: self.direction,
            alive: self.is_alive(),
            score: self.score,
        }
    }
}

/// Owned, serializable copy of a snake carried inside snapshots.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SnakeView {
    pub body: Vec<Point>,
    pub direction: Direction,
    pub alive: bool,
    pub score: u32,
}
