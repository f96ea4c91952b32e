//! Package model and detection (component C4): the chain of packages
//! that make up this bundle, the related bundles discovered on the
//! machine, and the per-kind detection rules that populate their
//! current state ahead of planning.

mod backend;
mod detect;
mod error;
mod package;
mod related_bundle;

pub use backend::{DetectBackend, RegistrationBackend};
pub use detect::{detect_all, detect_registration};
pub use error::{Error, Result};
pub use package::{
    ActionState, BundleSpec, CacheType, CurrentState, DependencyParent, DetectionType, ExeSpec,
    ExitCodeAction, ExitCodeRule, IgnoreDependencies, InstallRegistrationState, MsiSpec, MspSpec,
    Package, PackageKind, PatchTarget, ProtocolType, RequestState, RollbackBoundary,
};
pub use related_bundle::{dedup_related_bundles, RelatedBundle, RelationType};

#[cfg(test)]
mod tests {
    use super::*;
    use engine_vars::VariableStore;
    use std::cell::RefCell;
    use std::collections::HashMap;

    #[derive(Default)]
    struct FakeBackend {
        msi_states: HashMap<String, CurrentState>,
        msp_targets: HashMap<String, Vec<(String, bool, u32)>>,
        msp_states: HashMap<(String, String), CurrentState>,
        bundle_states: HashMap<(String, bool), CurrentState>,
        related_bundles: HashMap<(String, bool), Vec<(String, String)>>,
        arp: HashMap<String, String>,
        calls: RefCell<Vec<String>>,
    }

    impl DetectBackend for FakeBackend {
        fn msi_product_state(&self, product_code: &str) -> std::result::Result<CurrentState, String> {
            self.calls.borrow_mut().push(format!("msi:{product_code}"));
            Ok(*self.msi_states.get(product_code).unwrap_or(&CurrentState::Absent))
        }

        fn msi_product_version(&self, _product_code: &str) -> std::result::Result<Option<String>, String> {
            Ok(None)
        }

        fn msp_targets(&self, patch_code: &str) -> std::result::Result<Vec<(String, bool, u32)>, String> {
            Ok(self.msp_targets.get(patch_code).cloned().unwrap_or_default())
        }

        fn msp_state_for_target(
            &self,
            patch_code: &str,
            product_code: &str,
        ) -> std::result::Result<CurrentState, String> {
            Ok(*self
                .msp_states
                .get(&(patch_code.to_string(), product_code.to_string()))
                .unwrap_or(&CurrentState::Absent))
        }

        fn bundle_state(&self, provider_code: &str, per_machine: bool) -> std::result::Result<CurrentState, String> {
            Ok(*self
                .bundle_states
                .get(&(provider_code.to_string(), per_machine))
                .unwrap_or(&CurrentState::Absent))
        }

        fn bundle_version(
            &self,
            _provider_code: &str,
            _per_machine: bool,
        ) -> std::result::Result<Option<String>, String> {
            Ok(None)
        }

        fn related_bundle_versions(
            &self,
            provider_code: &str,
            per_machine: bool,
        ) -> std::result::Result<Vec<(String, String)>, String> {
            Ok(self
                .related_bundles
                .get(&(provider_code.to_string(), per_machine))
                .cloned()
                .unwrap_or_default())
        }

        fn exe_arp_version(&self, arp_key: &str) -> std::result::Result<Option<String>, String> {
            Ok(self.arp.get(arp_key).cloned())
        }
    }

    #[derive(Default)]
    struct FakeRegistrationBackend {
        states: HashMap<String, InstallRegistrationState>,
        registered: RefCell<Vec<(String, String)>>,
        unregistered: RefCell<Vec<(String, String)>>,
    }

    impl RegistrationBackend for FakeRegistrationBackend {
        fn registration_state(&self, package_id: &str) -> std::result::Result<InstallRegistrationState, String> {
            Ok(*self.states.get(package_id).unwrap_or(&InstallRegistrationState::Absent))
        }

        fn register_dependency(&self, package_id: &str, dependent: &str) -> std::result::Result<(), String> {
            self.registered.borrow_mut().push((package_id.to_string(), dependent.to_string()));
            Ok(())
        }

        fn unregister_dependency(&self, package_id: &str, dependent: &str) -> std::result::Result<(), String> {
            self.unregistered.borrow_mut().push((package_id.to_string(), dependent.to_string()));
            Ok(())
        }
    }

    fn bundle_package(id: &str, own_version: &str) -> Package {
        Package::new(
            id,
            PackageKind::Bundle(BundleSpec {
                detect_codes: vec!["{Family}".to_string()],
                upgrade_codes: Vec::new(),
                addon_codes: Vec::new(),
                patch_codes: Vec::new(),
                exit_codes: Vec::new(),
                own_version: engine_vars::Version::parse(own_version),
            }),
        )
    }

    #[test]
    fn exe_detection_none_is_always_absent() {
        let backend = FakeBackend::default();
        let store = VariableStore::new();
        let mut packages = vec![Package::new(
            "ExeA",
            PackageKind::Exe(ExeSpec {
                detection: DetectionType::None,
                arp_display_version: None,
                arp_per_machine: true,
                install_arguments: String::new(),
                repair_arguments: None,
                uninstall_arguments: None,
                exit_codes: Vec::new(),
                protocol: ProtocolType::None,
                repairable: false,
                uninstallable: false,
            }),
        )];
        detect_all(&mut packages, Vec::new(), &store, &backend).unwrap();
        assert_eq!(packages[0].current_state, CurrentState::Absent);
    }

    #[test]
    fn exe_detection_by_condition() {
        let backend = FakeBackend::default();
        let mut store = VariableStore::new();
        store.set_numeric("INSTALLED", 1, true).unwrap();
        let mut packages = vec![{
            let mut pkg = Package::new(
                "ExeB",
                PackageKind::Exe(ExeSpec {
                    detection: DetectionType::Condition,
                    arp_display_version: None,
                    arp_per_machine: true,
                    install_arguments: String::new(),
                    repair_arguments: None,
                    uninstall_arguments: None,
                    exit_codes: Vec::new(),
                    protocol: ProtocolType::None,
                    repairable: false,
                    uninstallable: false,
                }),
            );
            pkg.condition = Some("INSTALLED".to_string());
            pkg
        }];
        detect_all(&mut packages, Vec::new(), &store, &backend).unwrap();
        assert_eq!(packages[0].current_state, CurrentState::Present);
    }

    #[test]
    fn exe_detection_by_arp() {
        let mut backend = FakeBackend::default();
        backend.arp.insert("{ExeArpKey}".to_string(), "1.2.3".to_string());
        let store = VariableStore::new();
        let mut packages = vec![{
            let mut pkg = Package::new(
                "ExeC",
                PackageKind::Exe(ExeSpec {
                    detection: DetectionType::Arp,
                    arp_display_version: None,
                    arp_per_machine: true,
                    install_arguments: String::new(),
                    repair_arguments: None,
                    uninstall_arguments: None,
                    exit_codes: Vec::new(),
                    protocol: ProtocolType::None,
                    repairable: false,
                    uninstallable: false,
                }),
            );
            pkg.cache_id = "{ExeArpKey}".to_string();
            pkg
        }];
        detect_all(&mut packages, Vec::new(), &store, &backend).unwrap();
        assert_eq!(packages[0].current_state, CurrentState::Present);
    }

    fn exe_arp_package(declared_version: Option<&str>) -> Package {
        let mut pkg = Package::new(
            "ExeC",
            PackageKind::Exe(ExeSpec {
                detection: DetectionType::Arp,
                arp_display_version: declared_version.map(str::to_string),
                arp_per_machine: true,
                install_arguments: String::new(),
                repair_arguments: None,
                uninstall_arguments: None,
                exit_codes: Vec::new(),
                protocol: ProtocolType::None,
                repairable: false,
                uninstallable: false,
            }),
        );
        pkg.cache_id = "{ExeArpKey}".to_string();
        pkg
    }

    #[test]
    fn exe_arp_detection_is_obsolete_when_installed_version_is_older() {
        let mut backend = FakeBackend::default();
        backend.arp.insert("{ExeArpKey}".to_string(), "1.0.0".to_string());
        let store = VariableStore::new();
        let mut packages = vec![exe_arp_package(Some("2.0.0"))];
        detect_all(&mut packages, Vec::new(), &store, &backend).unwrap();
        assert_eq!(packages[0].current_state, CurrentState::Obsolete);
    }

    #[test]
    fn exe_arp_detection_is_absent_when_installed_version_is_newer() {
        let mut backend = FakeBackend::default();
        backend.arp.insert("{ExeArpKey}".to_string(), "3.0.0".to_string());
        let store = VariableStore::new();
        let mut packages = vec![exe_arp_package(Some("2.0.0"))];
        detect_all(&mut packages, Vec::new(), &store, &backend).unwrap();
        assert_eq!(packages[0].current_state, CurrentState::Absent);
    }

    #[test]
    fn exe_arp_detection_is_present_when_installed_version_matches() {
        let mut backend = FakeBackend::default();
        backend.arp.insert("{ExeArpKey}".to_string(), "2.0.0".to_string());
        let store = VariableStore::new();
        let mut packages = vec![exe_arp_package(Some("2.0.0"))];
        detect_all(&mut packages, Vec::new(), &store, &backend).unwrap();
        assert_eq!(packages[0].current_state, CurrentState::Present);
    }

    #[test]
    fn msi_detection_reads_backend_state() {
        let mut backend = FakeBackend::default();
        backend.msi_states.insert("{Product}".to_string(), CurrentState::Present);
        let store = VariableStore::new();
        let mut packages = vec![Package::new(
            "MsiA",
            PackageKind::Msi(MsiSpec {
                product_code: "{Product}".to_string(),
                upgrade_codes: Vec::new(),
                features: Vec::new(),
                slipstream_patches: Vec::new(),
            }),
        )];
        detect_all(&mut packages, Vec::new(), &store, &backend).unwrap();
        assert_eq!(packages[0].current_state, CurrentState::Present);
    }

    #[test]
    fn msp_targeting_sorts_by_sequence_and_folds_state() {
        let mut backend = FakeBackend::default();
        backend.msp_targets.insert(
            "{Patch}".to_string(),
            vec![
                ("{ProductB}".to_string(), true, 2),
                ("{ProductA}".to_string(), true, 1),
            ],
        );
        backend
            .msp_states
            .insert(("{Patch}".to_string(), "{ProductA}".to_string()), CurrentState::Superseded);
        backend
            .msp_states
            .insert(("{Patch}".to_string(), "{ProductB}".to_string()), CurrentState::Present);

        let store = VariableStore::new();
        let mut packages = vec![Package::new(
            "MspA",
            PackageKind::Msp(MspSpec {
                patch_code: "{Patch}".to_string(),
                target_products: Vec::new(),
            }),
        )];
        detect_all(&mut packages, Vec::new(), &store, &backend).unwrap();

        assert_eq!(packages[0].current_state, CurrentState::Superseded);
        let PackageKind::Msp(spec) = &packages[0].kind else { unreachable!() };
        assert_eq!(spec.target_products[0].product_code, "{ProductA}");
        assert_eq!(spec.target_products[1].product_code, "{ProductB}");
    }

    #[test]
    fn slipstream_patch_already_surfaced_as_a_target_is_marked_slipstream() {
        let mut backend = FakeBackend::default();
        backend
            .msp_targets
            .insert("{Patch}".to_string(), vec![("{Product}".to_string(), true, 1)]);
        backend
            .msp_states
            .insert(("{Patch}".to_string(), "{Product}".to_string()), CurrentState::Absent);

        let store = VariableStore::new();
        let mut packages = vec![
            Package::new(
                "MsiA",
                PackageKind::Msi(MsiSpec {
                    product_code: "{Product}".to_string(),
                    upgrade_codes: Vec::new(),
                    features: Vec::new(),
                    slipstream_patches: vec!["{Patch}".to_string()],
                }),
            ),
            Package::new("MspA", PackageKind::Msp(MspSpec { patch_code: "{Patch}".to_string(), target_products: Vec::new() })),
        ];
        detect_all(&mut packages, Vec::new(), &store, &backend).unwrap();

        let PackageKind::Msp(spec) = &packages[1].kind else { unreachable!() };
        assert_eq!(spec.target_products.len(), 1);
        assert!(spec.target_products[0].slipstream);
        assert!(!spec.target_products[0].slipstream_required);
    }

    #[test]
    fn slipstream_patch_never_surfaced_as_a_target_gets_a_synthetic_required_one() {
        let backend = FakeBackend::default();
        let store = VariableStore::new();
        let mut packages = vec![
            Package::new(
                "MsiA",
                PackageKind::Msi(MsiSpec {
                    product_code: "{Product}".to_string(),
                    upgrade_codes: Vec::new(),
                    features: Vec::new(),
                    slipstream_patches: vec!["{Patch}".to_string()],
                }),
            ),
            Package::new("MspA", PackageKind::Msp(MspSpec { patch_code: "{Patch}".to_string(), target_products: Vec::new() })),
        ];
        detect_all(&mut packages, Vec::new(), &store, &backend).unwrap();

        let PackageKind::Msp(spec) = &packages[1].kind else { unreachable!() };
        assert_eq!(spec.target_products.len(), 1);
        assert_eq!(spec.target_products[0].product_code, "{Product}");
        assert_eq!(spec.target_products[0].state, CurrentState::Absent);
        assert!(spec.target_products[0].slipstream);
        assert!(spec.target_products[0].slipstream_required);
    }

    #[test]
    fn related_bundles_dedup_keeping_strongest_state() {
        let mut backend = FakeBackend::default();
        backend
            .bundle_states
            .insert(("{Dep}".to_string(), true), CurrentState::Present);

        let store = VariableStore::new();
        let related = vec![
            RelatedBundle::new(Package::new("{Dep}", PackageKind::Bundle(BundleSpec {
                detect_codes: vec!["{Dep}".to_string()],
                upgrade_codes: Vec::new(),
                addon_codes: Vec::new(),
                patch_codes: Vec::new(),
                exit_codes: Vec::new(),
                own_version: engine_vars::Version::parse("1.0.0"),
            })), RelationType::Detect),
            RelatedBundle::new(Package::new("{Dep}", PackageKind::Bundle(BundleSpec {
                detect_codes: vec!["{Dep}".to_string()],
                upgrade_codes: Vec::new(),
                addon_codes: Vec::new(),
                patch_codes: Vec::new(),
                exit_codes: Vec::new(),
                own_version: engine_vars::Version::parse("1.0.0"),
            })), RelationType::Upgrade),
        ];

        let mut packages: Vec<Package> = Vec::new();
        let deduped = detect_all(&mut packages, related, &store, &backend).unwrap();
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].package.current_state, CurrentState::Present);
    }

    #[test]
    fn bundle_detect_matrix_covers_all_four_self_newer_combinations() {
        // Absent: nothing registered under the family code at all.
        let backend = FakeBackend::default();
        let store = VariableStore::new();
        let mut packages = vec![bundle_package("{Bundle}", "2.0.0")];
        detect_all(&mut packages, Vec::new(), &store, &backend).unwrap();
        assert_eq!(packages[0].current_state, CurrentState::Absent);

        // Present: only our own id, at our own version, is registered.
        let mut backend = FakeBackend::default();
        backend.related_bundles.insert(
            ("{Family}".to_string(), true),
            vec![("{Bundle}".to_string(), "2.0.0".to_string())],
        );
        let mut packages = vec![bundle_package("{Bundle}", "2.0.0")];
        detect_all(&mut packages, Vec::new(), &store, &backend).unwrap();
        assert_eq!(packages[0].current_state, CurrentState::Present);

        // Obsolete: a newer sibling is registered, but not ourselves.
        let mut backend = FakeBackend::default();
        backend.related_bundles.insert(
            ("{Family}".to_string(), true),
            vec![("{OtherBundle}".to_string(), "3.0.0".to_string())],
        );
        let mut packages = vec![bundle_package("{Bundle}", "2.0.0")];
        detect_all(&mut packages, Vec::new(), &store, &backend).unwrap();
        assert_eq!(packages[0].current_state, CurrentState::Obsolete);

        // Superseded: both ourselves and something newer are registered.
        let mut backend = FakeBackend::default();
        backend.related_bundles.insert(
            ("{Family}".to_string(), true),
            vec![
                ("{Bundle}".to_string(), "2.0.0".to_string()),
                ("{OtherBundle}".to_string(), "3.0.0".to_string()),
            ],
        );
        let mut packages = vec![bundle_package("{Bundle}", "2.0.0")];
        detect_all(&mut packages, Vec::new(), &store, &backend).unwrap();
        assert_eq!(packages[0].current_state, CurrentState::Superseded);
    }

    #[test]
    fn registration_detection_marks_non_affecting_packages_ignored() {
        let mut packages = vec![
            Package::new("Affects", PackageKind::MsuLike),
            Package::new("DoesNot", PackageKind::MsuLike),
        ];
        packages[1].can_affect_registration = false;

        let mut backend = FakeRegistrationBackend::default();
        backend.states.insert("Affects".to_string(), InstallRegistrationState::Present);

        detect_registration(&mut packages, &backend).unwrap();
        assert_eq!(packages[0].install_registration_state, InstallRegistrationState::Present);
        assert_eq!(packages[1].install_registration_state, InstallRegistrationState::Ignored);
    }

    #[test]
    fn registration_backend_records_register_and_unregister_calls() {
        let backend = FakeRegistrationBackend::default();
        backend.register_dependency("Shared", "Bundle1").unwrap();
        backend.unregister_dependency("Shared", "Bundle1").unwrap();
        assert_eq!(backend.registered.borrow().as_slice(), &[("Shared".to_string(), "Bundle1".to_string())]);
        assert_eq!(backend.unregistered.borrow().as_slice(), &[("Shared".to_string(), "Bundle1".to_string())]);
    }
}
