//! Maps a [`Session`] snapshot onto the screen graph to mount.

use shared::domain::Role;

use crate::session::{ProfileState, Session};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Screen {
    SignIn,
    AdminDashboard,
    CreateWorkout,
    RegisterStudent,
    StudentHome,
    ProfileError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Loading,
    Auth,
    Admin,
    Student,
    /// Signed in, but the identity has no usable profile. The only way out is
    /// signing out.
    ProfileError,
}

impl Route {
    /// Screens reachable from this route; the first one is the entry point.
    pub fn screens(self) -> &'static [Screen] {
        match self {
            Self::Loading => &[],
            Self::Auth => &[Screen::SignIn],
            Self::Admin => &[
                Screen::AdminDashboard,
                Screen::CreateWorkout,
                Screen::RegisterStudent,
            ],
            Self::Student => &[Screen::StudentHome],
            Self::ProfileError => &[Screen::ProfileError],
        }
    }

    pub fn entry_screen(self) -> Option<Screen> {
        self.screens().first().copied()
    }

    pub fn requires_sign_out(self) -> bool {
        self == Self::ProfileError
    }
}

pub fn select_route(session: &Session) -> Route {
    if session.loading {
        return Route::Loading;
    }
    if session.identity.is_none() {
        return Route::Auth;
    }
    match &session.profile {
        ProfileState::Unresolved => Route::Loading,
        ProfileState::Resolved(profile) => match profile.role {
            Role::Admin => Route::Admin,
            Role::Student => Route::Student,
        },
        ProfileState::Failed(_) => Route::ProfileError,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{backend::AuthIdentity, profile::ProfileError};
    use shared::domain::{Profile, UserId};

    fn identity() -> AuthIdentity {
        AuthIdentity {
            uid: UserId::new("u-1"),
            email: "u1@example.com".into(),
        }
    }

    fn resolved(role: Role) -> ProfileState {
        ProfileState::Resolved(Profile {
            name: "Someone".into(),
            role,
        })
    }

    fn all_profile_states() -> Vec<ProfileState> {
        vec![
            ProfileState::Unresolved,
            resolved(Role::Admin),
            resolved(Role::Student),
            ProfileState::Failed(ProfileError::NotFound(UserId::new("u-1"))),
        ]
    }

    #[test]
    fn loading_always_wins() {
        for identity in [None, Some(identity())] {
            for profile in all_profile_states() {
                let session = Session {
                    identity: identity.clone(),
                    profile,
                    loading: true,
                };
                assert_eq!(select_route(&session), Route::Loading);
            }
        }
    }

    #[test]
    fn signed_out_selects_auth_graph_whatever_the_profile() {
        for profile in all_profile_states() {
            let session = Session {
                identity: None,
                profile,
                loading: false,
            };
            assert_eq!(select_route(&session), Route::Auth);
        }
    }

    #[test]
    fn role_selects_graph_once_resolved() {
        let mut session = Session {
            identity: Some(identity()),
            profile: resolved(Role::Admin),
            loading: false,
        };
        assert_eq!(select_route(&session), Route::Admin);
        assert_eq!(
            select_route(&session).entry_screen(),
            Some(Screen::AdminDashboard)
        );

        session.profile = resolved(Role::Student);
        assert_eq!(select_route(&session), Route::Student);
    }

    #[test]
    fn unresolved_profile_never_exposes_a_role_graph() {
        let session = Session {
            identity: Some(identity()),
            profile: ProfileState::Unresolved,
            loading: false,
        };
        assert_eq!(select_route(&session), Route::Loading);
        assert!(select_route(&session).screens().is_empty());
    }

    #[test]
    fn failed_profile_requires_sign_out() {
        let session = Session {
            identity: Some(identity()),
            profile: ProfileState::Failed(ProfileError::UnknownRole {
                uid: UserId::new("u-1"),
                role: "coach".into(),
            }),
            loading: false,
        };
        let route = select_route(&session);
        assert_eq!(route, Route::ProfileError);
        assert!(route.requires_sign_out());
    }
}
