use std::sync::Arc;

use glam::{IVec2, UVec2};
use jstage::error::EngineError;
use jstage::level::{Entity, Grid, ObjectRef};

fn entity(id: u64, collisions: bool) -> ObjectRef {
    Arc::new(Entity::new(id, collisions))
}

#[test]
fn three_by_three_walls_and_moves() {
    let mut grid = Grid::new(UVec2::new(3, 3));
    let hero = entity(1, true);

    grid.set_wall(IVec2::new(1, 1), true).unwrap();
    assert!(grid.place(Arc::clone(&hero), IVec2::new(0, 0)).unwrap());

    assert!(!grid.check_tile_available(IVec2::new(1, 1)), "wall");
    assert!(!grid.check_tile_available(IVec2::new(0, 0)), "occupied by a colliding object");
    assert!(grid.check_tile_available(IVec2::new(2, 2)));

    assert!(grid.move_object(&hero, IVec2::new(0, 0), IVec2::new(0, 1)).unwrap());
    assert!(grid.objects_at(IVec2::new(0, 0)).is_empty());
    assert_eq!(grid.objects_at(IVec2::new(0, 1)).len(), 1);
    assert!(grid.check_tile_available(IVec2::new(0, 0)));
    assert_eq!(grid.position_of(&hero), Some(IVec2::new(0, 1)));
}

#[test]
fn moving_an_absent_object_changes_nothing() {
    let mut grid = Grid::new(UVec2::new(3, 3));
    let placed = entity(1, true);
    let stray = entity(2, true);
    grid.place(Arc::clone(&placed), IVec2::new(2, 2)).unwrap();

    assert!(!grid.move_object(&stray, IVec2::new(0, 0), IVec2::new(1, 0)).unwrap());
    assert!(!grid.move_object(&placed, IVec2::new(0, 0), IVec2::new(1, 0)).unwrap(), "wrong source tile");
    assert_eq!(grid.object_count(), 1);
    assert_eq!(grid.position_of(&placed), Some(IVec2::new(2, 2)));
    assert!(grid.objects_at(IVec2::new(1, 0)).is_empty());
}

#[test]
fn moves_keep_one_occurrence_per_object() {
    let mut grid = Grid::new(UVec2::new(4, 4));
    let objects: Vec<ObjectRef> = (0..3).map(|i| entity(i, false)).collect();
    for (i, object) in objects.iter().enumerate() {
        grid.place(Arc::clone(object), IVec2::new(i as i32, 0)).unwrap();
    }

    let path = [IVec2::new(0, 0), IVec2::new(0, 1), IVec2::new(1, 1), IVec2::new(3, 3)];
    for step in path.windows(2) {
        assert!(grid.move_object(&objects[0], step[0], step[1]).unwrap());
        assert_eq!(grid.object_count(), 3);
        for object in &objects {
            assert_eq!(grid.occurrences(object), 1);
        }
    }
    assert_eq!(grid.position_of(&objects[0]), Some(IVec2::new(3, 3)));
}

#[test]
fn placing_twice_is_refused() {
    let mut grid = Grid::new(UVec2::new(2, 2));
    let object = entity(1, true);
    assert!(grid.place(Arc::clone(&object), IVec2::new(0, 0)).unwrap());
    assert!(!grid.place(Arc::clone(&object), IVec2::new(1, 1)).unwrap());
    assert_eq!(grid.occurrences(&object), 1);
}

#[test]
fn out_of_bounds_tiles() {
    let mut grid = Grid::new(UVec2::new(3, 2));
    let object = entity(1, true);

    for tile in [IVec2::new(-1, 0), IVec2::new(3, 0), IVec2::new(0, 2)] {
        assert!(!grid.in_bounds(tile));
        assert!(!grid.check_tile_available(tile));
        assert!(grid.objects_at(tile).is_empty());
        assert!(!grid.is_wall(tile));
    }
    assert!(matches!(
        grid.place(Arc::clone(&object), IVec2::new(3, 0)),
        Err(EngineError::OutOfBounds { x: 3, y: 0 })
    ));
    assert!(matches!(grid.set_wall(IVec2::new(0, -1), true), Err(EngineError::OutOfBounds { .. })));

    grid.place(Arc::clone(&object), IVec2::new(2, 1)).unwrap();
    assert!(grid.move_object(&object, IVec2::new(2, 1), IVec2::new(2, 2)).is_err());
    assert_eq!(grid.position_of(&object), Some(IVec2::new(2, 1)), "failed move keeps the object");
}

#[test]
fn non_colliding_objects_do_not_block() {
    let mut grid = Grid::new(UVec2::new(2, 2));
    let ghost = Arc::new(Entity::new(1, false));
    let as_grid: ObjectRef = ghost.clone();
    grid.place(as_grid, IVec2::new(0, 0)).unwrap();
    assert!(grid.check_tile_available(IVec2::new(0, 0)));

    ghost.set_collisions(true);
    assert!(!grid.check_tile_available(IVec2::new(0, 0)));
}

#[test]
fn clear_drops_objects_but_keeps_walls() {
    let mut grid = Grid::new(UVec2::new(2, 2));
    grid.set_wall(IVec2::new(1, 0), true).unwrap();
    grid.place(entity(1, true), IVec2::new(0, 0)).unwrap();
    grid.place(entity(2, true), IVec2::new(0, 0)).unwrap();
    assert_eq!(grid.objects_at(IVec2::new(0, 0)).len(), 2);

    grid.clear();
    assert_eq!(grid.object_count(), 0);
    assert!(grid.is_wall(IVec2::new(1, 0)));
    assert!(grid.check_tile_available(IVec2::new(0, 0)));
}

#[test]
fn remove_reports_whether_the_object_was_there() {
    let mut grid = Grid::new(UVec2::new(2, 2));
    let object = entity(1, true);
    grid.place(Arc::clone(&object), IVec2::new(1, 1)).unwrap();
    assert!(!grid.remove(&object, IVec2::new(0, 0)).unwrap());
    assert!(grid.remove(&object, IVec2::new(1, 1)).unwrap());
    assert_eq!(grid.position_of(&object), None);
    assert_eq!(grid.dimensions(), UVec2::new(2, 2));
}

#[test]
fn wide_grids_index_the_far_corner() {
    let mut grid = Grid::new(UVec2::new(100_000, 3));
    let object = entity(1, true);
    let corner = IVec2::new(99_999, 2);
    assert!(grid.place(Arc::clone(&object), corner).unwrap());
    assert!(!grid.check_tile_available(corner));
    assert!(grid.check_tile_available(IVec2::new(99_999, 1)));
    assert_eq!(grid.position_of(&object), Some(corner));
}
