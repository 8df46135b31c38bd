//! Assignment of classes to output files.
//!
//! Every output file must stay within the 65536 entry limit of the method and field id tables,
//! counted over the methods and fields a file *references*, not only those it defines. The
//! distributors build [`VirtualFile`]s transactionally: classes are added together with their
//! closure, the counts are checked, and the addition is committed or rolled back.
//!
//! Three strategies share the [`Distributor`] contract:
//!
//! - [`FilePerClassDistributor`] - one file per class, synthesized classes optionally riding
//!   along with the class they were created for
//! - [`MonoDexDistributor`] - everything in one file, overflow is fatal
//! - [`FillFilesDistributor`] - main-dex list first, then startup classes, then the
//!   [`package::PackageSplitPopulator`] over the rest
//!
//! Feature split classes are taken out of the base partition and distributed into their own
//! files, numbered from 0 per split. Tool markers go into the first file of every partition.
//!
//! # Examples
//!
//! ```rust,ignore
//! let context = DistributionContext::new(&app, &options, &IdentityLens, &diagnostics);
//! let files = distribute(context)?;
//! for file in &files {
//!     println!("file {}: {} classes", file.id(), file.classes().len());
//! }
//! ```

pub mod cycler;
pub mod package;
pub mod virtual_file;

use std::collections::{BTreeMap, HashMap, HashSet};

pub use cycler::VirtualFileCycler;
pub use package::PackageSplitPopulator;
pub use virtual_file::{IndexedItemTransaction, VirtualFile};

use crate::{
    diagnostics::{DiagnosticCategory, Diagnostics},
    model::{
        class::ClassRc, items::TypeRc, naming::NamingLens, string::StringRc, Application,
    },
    Options, Result,
};

/// Everything a distributor reads.
pub struct DistributionContext<'a> {
    /// The classes to distribute
    pub app: &'a Application,
    /// Limits, main-dex list, startup classes and feature splits
    pub options: &'a Options,
    /// Output naming
    pub lens: &'a dyn NamingLens,
    /// Receives warnings
    pub diagnostics: &'a Diagnostics,
    /// Marker strings added to the first file of every partition
    pub marker_strings: Vec<StringRc>,
}

impl<'a> DistributionContext<'a> {
    /// A context without marker strings.
    #[must_use]
    pub fn new(
        app: &'a Application,
        options: &'a Options,
        lens: &'a dyn NamingLens,
        diagnostics: &'a Diagnostics,
    ) -> DistributionContext<'a> {
        DistributionContext {
            app,
            options,
            lens,
            diagnostics,
            marker_strings: Vec::new(),
        }
    }

    /// Add marker strings.
    #[must_use]
    pub fn with_marker_strings(mut self, marker_strings: Vec<StringRc>) -> Self {
        self.marker_strings = marker_strings;
        self
    }

    fn add_markers(&self, file: &mut VirtualFile) {
        for marker in &self.marker_strings {
            file.inject_string(marker);
        }
    }
}

/// A class distribution strategy.
pub trait Distributor {
    /// Build the output files.
    ///
    /// # Errors
    /// Returns a capacity error if the classes cannot be placed within the limits.
    fn run(self) -> Result<Vec<VirtualFile>>;
}

/// Pick the strategy for `context.options` and run it.
///
/// # Errors
/// Returns the error of the selected distributor.
pub fn distribute(context: DistributionContext<'_>) -> Result<Vec<VirtualFile>> {
    let options = context.options;
    let files = if options.dex_file_per_class {
        FilePerClassDistributor::new(context).run()?
    } else if options.can_use_multidex() || !options.main_dex_list.is_empty() {
        FillFilesDistributor::new(context).run()?
    } else {
        MonoDexDistributor::new(context).run()?
    };

    log::debug!("Distributed classes into {} files", files.len());
    Ok(files)
}

/// One file per class.
pub struct FilePerClassDistributor<'a> {
    context: DistributionContext<'a>,
}

impl<'a> FilePerClassDistributor<'a> {
    /// Create the distributor.
    #[must_use]
    pub fn new(context: DistributionContext<'a>) -> Self {
        FilePerClassDistributor { context }
    }
}

impl Distributor for FilePerClassDistributor<'_> {
    fn run(self) -> Result<Vec<VirtualFile>> {
        let context = &self.context;
        let combine = context.options.combine_synthetic_classes_with_primary_class;

        let mut files: Vec<VirtualFile> = Vec::new();
        let mut file_of: HashMap<TypeRc, usize> = HashMap::new();
        let mut derived: Vec<(TypeRc, ClassRc)> = Vec::new();

        for class in context.app.classes() {
            if combine {
                if let Some(origin) = &class.synthesizing_context {
                    if *origin != class.ty && context.app.class(origin).is_some() {
                        derived.push((origin.clone(), class.clone()));
                        continue;
                    }
                }
            }
            let mut file = VirtualFile::for_class(files.len(), class, context.lens);
            context.add_markers(&mut file);
            file.add_class(class, context.lens);
            file.commit();
            file_of.insert(class.ty.clone(), files.len());
            files.push(file);
        }

        for (origin, synthetic) in derived {
            if let Some(&index) = file_of.get(&origin) {
                files[index].add_class(&synthetic, context.lens);
                files[index].commit();
            }
        }
        Ok(files)
    }
}

/// Shared steps of the filling distributors.
struct DistributorBase<'a> {
    context: DistributionContext<'a>,
    classes: Vec<ClassRc>,
    files: Vec<VirtualFile>,
}

impl<'a> DistributorBase<'a> {
    fn new(context: DistributionContext<'a>) -> Self {
        let classes = context.app.classes().to_vec();
        let mut main_dex_file = VirtualFile::new(0, None);
        context.add_markers(&mut main_dex_file);
        DistributorBase {
            context,
            classes,
            files: vec![main_dex_file],
        }
    }

    /// Place the main-dex list into file 0.
    ///
    /// The list goes in as one transaction. When that overflows, the classes are added one by
    /// one so the reported counts cover the whole list.
    fn fill_for_main_dex_list(&mut self) -> Result<()> {
        let context = &self.context;
        if context.options.main_dex_list.is_empty() {
            return Ok(());
        }

        let mut main_dex_classes = Vec::new();
        for descriptor in &context.options.main_dex_list {
            match context.app.class_by_descriptor(descriptor) {
                Some(class) => main_dex_classes.push(class.clone()),
                None => context.diagnostics.warning(
                    DiagnosticCategory::MainDex,
                    format!("Main dex class {descriptor} is not defined"),
                ),
            }
        }

        let max_entries = context.options.max_entries();
        let main_dex_file = &mut self.files[0];
        for class in &main_dex_classes {
            main_dex_file.add_class(class, context.lens);
        }
        if main_dex_file.is_full(max_entries) {
            main_dex_file.abort();
            for class in &main_dex_classes {
                main_dex_file.add_class(class, context.lens);
                main_dex_file.commit();
            }
        } else {
            main_dex_file.commit();
        }

        let placed: HashSet<&TypeRc> = main_dex_classes.iter().map(|class| &class.ty).collect();
        self.classes.retain(|class| !placed.contains(&class.ty));
        self.files[0].throw_if_full(max_entries, true)
    }

    fn remove_feature_split_classes(&mut self) -> BTreeMap<String, Vec<ClassRc>> {
        let options = self.context.options;
        let mut features: BTreeMap<String, Vec<ClassRc>> = BTreeMap::new();
        if options.feature_splits.is_empty() {
            return features;
        }
        self.classes.retain(|class| match options.feature_of(&class.descriptor()) {
            Some(feature) => {
                features
                    .entry(feature.to_string())
                    .or_default()
                    .push(class.clone());
                false
            }
            None => true,
        });
        features
    }

    fn add_feature_split_files(&mut self, features: BTreeMap<String, Vec<ClassRc>>) -> Result<()> {
        for (feature, classes) in features {
            let mut feature_file = VirtualFile::new(0, Some(feature.clone()));
            self.context.add_markers(&mut feature_file);
            let index = self.files.len();
            self.files.push(feature_file);

            let cycler = VirtualFileCycler::new(vec![index], 1, Some(feature));
            PackageSplitPopulator::new(
                classes,
                cycler,
                self.context.options,
                self.context.lens,
                self.context.diagnostics,
            )
            .run(&mut self.files)?;
        }
        Ok(())
    }
}

/// Fills files in package order.
pub struct FillFilesDistributor<'a> {
    base: DistributorBase<'a>,
}

impl<'a> FillFilesDistributor<'a> {
    /// Create the distributor. File 0 is created right away and receives the markers.
    #[must_use]
    pub fn new(context: DistributionContext<'a>) -> Self {
        FillFilesDistributor {
            base: DistributorBase::new(context),
        }
    }
}

impl Distributor for FillFilesDistributor<'_> {
    fn run(mut self) -> Result<Vec<VirtualFile>> {
        let base = &mut self.base;
        base.fill_for_main_dex_list()?;
        if base.classes.is_empty() {
            return Ok(self.base.files);
        }

        let options = base.context.options;
        let legacy_main_dex = !base.files[0].is_empty();
        let for_distribution = if options.minimal_main_dex && legacy_main_dex {
            Vec::new()
        } else {
            vec![0]
        };

        let features = base.remove_feature_split_classes();
        let cycler = VirtualFileCycler::new(for_distribution, 1, None);
        let classes = std::mem::take(&mut base.classes);
        PackageSplitPopulator::new(
            classes,
            cycler,
            options,
            base.context.lens,
            base.context.diagnostics,
        )
        .run(&mut base.files)?;
        base.add_feature_split_files(features)?;
        Ok(self.base.files)
    }
}

/// Puts every class into a single file.
pub struct MonoDexDistributor<'a> {
    base: DistributorBase<'a>,
}

impl<'a> MonoDexDistributor<'a> {
    /// Create the distributor.
    #[must_use]
    pub fn new(context: DistributionContext<'a>) -> Self {
        MonoDexDistributor {
            base: DistributorBase::new(context),
        }
    }
}

impl Distributor for MonoDexDistributor<'_> {
    fn run(mut self) -> Result<Vec<VirtualFile>> {
        let base = &mut self.base;
        let features = base.remove_feature_split_classes();
        let lens = base.context.lens;
        for class in &base.classes {
            base.files[0].add_class(class, lens);
        }
        base.files[0].commit();
        base.files[0].throw_if_full(base.context.options.max_entries(), false)?;
        base.add_feature_split_files(features)?;
        Ok(self.base.files)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        model::{
            class::{AccessFlags, DexProgramClass},
            naming::IdentityLens,
            ItemFactory,
        },
        Error,
    };

    fn app(descriptors: &[&str]) -> Application {
        let factory = Arc::new(ItemFactory::new());
        let classes = descriptors
            .iter()
            .map(|descriptor| {
                Arc::new(DexProgramClass::new(
                    factory.create_type(descriptor),
                    AccessFlags::PUBLIC,
                    Some(factory.object_type()),
                ))
            })
            .collect();
        Application::new(factory, classes, Vec::new()).unwrap()
    }

    #[test]
    fn test_single_class_single_file() {
        let app = app(&["Lcom/example/Main;"]);
        let options = Options::default();
        let diagnostics = Diagnostics::new();
        let files = distribute(DistributionContext::new(&app, &options, &IdentityLens, &diagnostics))
            .unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].class_descriptors(), vec!["Lcom/example/Main;"]);
    }

    #[test]
    fn test_file_per_class_with_synthetics() {
        let factory = Arc::new(ItemFactory::new());
        let main = Arc::new(DexProgramClass::new(
            factory.create_type("La/Main;"),
            AccessFlags::PUBLIC,
            Some(factory.object_type()),
        ));
        let lambda = Arc::new(
            DexProgramClass::new(
                factory.create_type("La/Main$$Lambda;"),
                AccessFlags::SYNTHETIC,
                Some(factory.object_type()),
            )
            .with_synthesizing_context(main.ty.clone()),
        );
        let app = Application::new(factory, vec![main, lambda], Vec::new()).unwrap();
        let options = Options::default().with_dex_file_per_class(true);
        let diagnostics = Diagnostics::new();

        let files = distribute(DistributionContext::new(&app, &options, &IdentityLens, &diagnostics))
            .unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].primary_class_descriptor(), Some("La/Main;"));
        assert_eq!(files[0].classes().len(), 2);
    }

    #[test]
    fn test_missing_main_dex_class_warns() {
        let app = app(&["La/A;"]);
        let options = Options::default().with_main_dex_list(vec!["La/Missing;".to_string()]);
        let diagnostics = Diagnostics::new();
        let files = distribute(DistributionContext::new(&app, &options, &IdentityLens, &diagnostics))
            .unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(diagnostics.warning_count(), 1);
    }

    #[test]
    fn test_mono_dex_overflow() {
        let factory = Arc::new(ItemFactory::new());
        let ty = factory.create_type("La/A;");
        let proto = factory.create_proto(&factory.void_type(), vec![]);
        let mut class = DexProgramClass::new(ty.clone(), AccessFlags::PUBLIC, None);
        for i in 0..3 {
            class = class.with_method(crate::model::class::EncodedMethod::new(
                factory.create_method(&ty, &proto, &format!("m{i}")),
                AccessFlags::PUBLIC | AccessFlags::ABSTRACT,
                None,
            ));
        }
        let app = Application::new(factory, vec![Arc::new(class)], Vec::new()).unwrap();
        let options = Options::default()
            .with_min_api_level(19)
            .with_testing(crate::options::TestingOptions {
                max_entries_override: Some(2),
                ..Default::default()
            });
        let diagnostics = Diagnostics::new();

        let result = distribute(DistributionContext::new(&app, &options, &IdentityLens, &diagnostics));
        assert!(matches!(
            result,
            Err(Error::FileOverflow {
                methods: 3,
                fields: 0,
                main_dex: false,
                limit: 2
            })
        ));
    }

    #[test]
    fn test_main_dex_overflow() {
        let factory = Arc::new(ItemFactory::new());
        let proto = factory.create_proto(&factory.void_type(), vec![]);
        let classes = ["La/A;", "La/B;"]
            .iter()
            .map(|descriptor| {
                let ty = factory.create_type(descriptor);
                let mut class =
                    DexProgramClass::new(ty.clone(), AccessFlags::PUBLIC, Some(factory.object_type()));
                for name in ["m0", "m1"] {
                    class = class.with_method(crate::model::class::EncodedMethod::new(
                        factory.create_method(&ty, &proto, name),
                        AccessFlags::PUBLIC | AccessFlags::ABSTRACT,
                        None,
                    ));
                }
                Arc::new(class)
            })
            .collect();
        let app = Application::new(factory, classes, Vec::new()).unwrap();
        let options = Options::default()
            .with_main_dex_list(vec!["La/A;".to_string(), "La/B;".to_string()])
            .with_testing(crate::options::TestingOptions {
                max_entries_override: Some(3),
                ..Default::default()
            });
        let diagnostics = Diagnostics::new();

        let result = distribute(DistributionContext::new(&app, &options, &IdentityLens, &diagnostics));
        assert!(matches!(
            result,
            Err(Error::FileOverflow {
                methods: 4,
                fields: 0,
                main_dex: true,
                limit: 3
            })
        ));
    }
}
