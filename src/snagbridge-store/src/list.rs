//! Replace-or-append helper shared by every list-shaped record.

/// What [`upsert_by`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Replaced,
    Appended,
}

/// Replace the first element that `same` considers equal to `item`,
/// otherwise append it. Order of existing elements is preserved.
pub fn upsert_by<T, F>(list: &mut Vec<T>, item: T, same: F) -> Upsert
where
    F: Fn(&T, &T) -> bool,
{
    match list.iter().position(|existing| same(existing, &item)) {
        Some(index) => {
            list[index] = item;
            Upsert::Replaced
        }
        None => {
            list.push(item);
            Upsert::Appended
        }
    }
}
