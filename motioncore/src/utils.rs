use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SideData<T> {
    pub left: T,
    pub right: T,
}

impl<T> SideData<T> {
    pub fn map<U, F: FnMut(T) -> U>(self, mut f: F) -> SideData<U> {
        SideData {
            left: f(self.left),
            right: f(self.right),
        }
    }
}

/// Per-wheel values of a four wheel holonomic (X) drive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct XDriveData<T> {
    pub top_left: T,
    pub top_right: T,
    pub bottom_left: T,
    pub bottom_right: T,
}

impl<T> XDriveData<T> {
    pub fn map<U, F: FnMut(T) -> U>(self, mut f: F) -> XDriveData<U> {
        XDriveData {
            top_left: f(self.top_left),
            top_right: f(self.top_right),
            bottom_left: f(self.bottom_left),
            bottom_right: f(self.bottom_right),
        }
    }
}
